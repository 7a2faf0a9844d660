// Request argument validation
// Every operation checks its inputs here before a request is built

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::RwLock;

use crate::error::{CmqError, Result};

static NAME_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9_-]*$").unwrap());

static HANDLE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9%#:_-]+$").unwrap());

static LIMITS: Lazy<RwLock<Limits>> = Lazy::new(|| RwLock::new(Limits::default()));

/// Service-side bounds applied to request arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_queue_name_size: usize,
    pub max_topic_name_size: usize,
    pub max_message_size: usize,
    pub max_message_count: usize,
    pub max_delay_seconds: u64,
    pub max_wait_seconds: u64,
    pub max_handle_count: usize,
    pub max_handle_length: usize,
    pub max_routing_key_length: usize,
    pub max_routing_key_dots: usize,
    pub max_tag_count: usize,
    pub max_tag_length: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_queue_name_size: 64,
            max_topic_name_size: 64,
            max_message_size: 1024 * 1024,
            max_message_count: 16,
            max_delay_seconds: 70 * 24 * 60 * 60,
            max_wait_seconds: 30,
            max_handle_count: 16,
            max_handle_length: 256,
            max_routing_key_length: 64,
            max_routing_key_dots: 15,
            max_tag_count: 5,
            max_tag_length: 16,
        }
    }
}

impl Limits {
    /// Limits in effect for this process
    pub fn current() -> Limits {
        *LIMITS.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the process-wide limits
    pub fn set(limits: Limits) {
        *LIMITS.write().unwrap_or_else(|e| e.into_inner()) = limits;
    }

    /// Apply a change to the process-wide limits
    pub fn update(f: impl FnOnce(&mut Limits)) {
        let mut guard = LIMITS.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard);
    }
}

fn check_name(field: &'static str, name: &str, max: usize) -> Result<()> {
    if name.is_empty() || name.len() > max || !NAME_PATTERN.is_match(name) {
        return Err(CmqError::invalid(field, format!("0<len<{}", max + 1), name));
    }
    Ok(())
}

pub fn queue_name(name: &str) -> Result<()> {
    check_name("queue name", name, Limits::current().max_queue_name_size)
}

pub fn topic_name(name: &str) -> Result<()> {
    check_name("topic name", name, Limits::current().max_topic_name_size)
}

/// Message bodies are reported by length, never echoed
pub fn message(body: &str) -> Result<()> {
    let max = Limits::current().max_message_size;
    if body.is_empty() || body.len() > max {
        return Err(CmqError::invalid(
            "message length",
            format!("0<len<{}", max + 1),
            body.len(),
        ));
    }
    Ok(())
}

pub fn messages<S: AsRef<str>>(bodies: &[S]) -> Result<()> {
    let max = Limits::current().max_message_count;
    if bodies.is_empty() || bodies.len() > max {
        return Err(CmqError::invalid(
            "message count",
            format!("0<len<{}", max + 1),
            bodies.len(),
        ));
    }
    bodies.iter().try_for_each(|b| message(b.as_ref()))
}

pub fn delay_seconds(delay: u64) -> Result<()> {
    let max = Limits::current().max_delay_seconds;
    if delay > max {
        return Err(CmqError::invalid("delay seconds", format!("0~{}", max), delay));
    }
    Ok(())
}

pub fn polling_wait_seconds(wait: u64) -> Result<()> {
    let max = Limits::current().max_wait_seconds;
    if wait > max {
        return Err(CmqError::invalid(
            "polling wait seconds",
            format!("0~{}", max),
            wait,
        ));
    }
    Ok(())
}

pub fn number_of_messages(n: usize) -> Result<()> {
    let max = Limits::current().max_message_count;
    if n < 1 || n > max {
        return Err(CmqError::invalid("number of message", format!("1~{}", max), n));
    }
    Ok(())
}

pub fn receipt_handle(handle: &str) -> Result<()> {
    let max = Limits::current().max_handle_length;
    if handle.len() > max || !HANDLE_PATTERN.is_match(handle) {
        return Err(CmqError::invalid(
            "receipt handle",
            format!("0<len<{}", max + 1),
            handle,
        ));
    }
    Ok(())
}

pub fn receipt_handles<S: AsRef<str>>(handles: &[S]) -> Result<()> {
    let max = Limits::current().max_handle_count;
    if handles.is_empty() || handles.len() > max {
        return Err(CmqError::invalid(
            "receipt handle count",
            format!("1~{}", max),
            handles.len(),
        ));
    }
    handles.iter().try_for_each(|h| receipt_handle(h.as_ref()))
}

pub fn routing_key(key: &str) -> Result<()> {
    let limits = Limits::current();
    if key.len() > limits.max_routing_key_length {
        return Err(CmqError::invalid(
            "routing key",
            format!("0<=len<{}", limits.max_routing_key_length + 1),
            key,
        ));
    }
    if key.matches('.').count() > limits.max_routing_key_dots {
        return Err(CmqError::invalid(
            "routing key dots",
            format!("0~{}", limits.max_routing_key_dots),
            key,
        ));
    }
    Ok(())
}

pub fn tags<S: AsRef<str>>(tags: &[S]) -> Result<()> {
    let limits = Limits::current();
    if tags.len() > limits.max_tag_count {
        return Err(CmqError::invalid(
            "message tag count",
            format!("0~{}", limits.max_tag_count),
            tags.len(),
        ));
    }
    for tag in tags {
        let tag = tag.as_ref();
        if tag.is_empty() || tag.len() > limits.max_tag_length {
            return Err(CmqError::invalid(
                "message tag",
                format!("0<len<{}", limits.max_tag_length + 1),
                tag,
            ));
        }
    }
    Ok(())
}
