//! Pre-generated message bodies.

use rand::Rng;

/// 2 MiB of random visible ASCII
pub const POOL_SIZE: usize = 2 * 1024 * 1024;

/// Largest message the pool can serve
pub const MAX_MESSAGE_SIZE: usize = POOL_SIZE - 1;

pub struct MessagePool {
    data: String,
}

impl MessagePool {
    pub fn new() -> Self {
        // '&' would split a parameter on the unescaped wire
        let alphabet: Vec<u8> = (b'!'..b'~').filter(|&b| b != b'&').collect();
        let mut rng = rand::thread_rng();
        let data: String = (0..POOL_SIZE)
            .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
            .collect();
        Self { data }
    }

    /// A random window of the pool, `size` long or 1..=size when `random`
    pub fn message(&self, size: usize, random: bool) -> &str {
        let size = size.min(MAX_MESSAGE_SIZE);
        if size == 0 {
            return "";
        }
        let mut rng = rand::thread_rng();
        let head = rng.gen_range(0..POOL_SIZE - size);
        let len = if random { rng.gen_range(1..=size) } else { size };
        &self.data[head..head + len]
    }

    pub fn messages(&self, count: usize, size: usize, random: bool) -> Vec<&str> {
        (0..count).map(|_| self.message(size, random)).collect()
    }
}

impl Default for MessagePool {
    fn default() -> Self {
        Self::new()
    }
}
