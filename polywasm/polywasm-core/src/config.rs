//! Engine limits, passed explicitly to decoding and owned by the [`Store`](crate::runtime::Store).

/// Maximum number of 64 KiB pages addressable with 32-bit indices.
pub const MAX_PAGES: u32 = 65_536;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Nested calls deeper than this trap with `CallStackExhausted`.
    pub max_call_depth: usize,
    /// Upper bound on params + declared locals of a single function.
    pub max_function_locals: u32,
    /// Upper bound on block/loop/if nesting inside one function body.
    pub max_control_depth: usize,
    /// Hard cap on any memory's page count, whatever its declared maximum.
    pub max_memory_pages: u32,
    /// Hard cap on any table's element count.
    pub max_table_elements: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_call_depth: 256,
            max_function_locals: 50_000,
            max_control_depth: 1_024,
            max_memory_pages: MAX_PAGES,
            max_table_elements: 10_000_000,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_max_function_locals(mut self, n: u32) -> Self {
        self.max_function_locals = n;
        self
    }

    pub fn with_max_control_depth(mut self, depth: usize) -> Self {
        self.max_control_depth = depth;
        self
    }

    pub fn with_max_memory_pages(mut self, pages: u32) -> Self {
        self.max_memory_pages = pages.min(MAX_PAGES);
        self
    }

    pub fn with_max_table_elements(mut self, n: u32) -> Self {
        self.max_table_elements = n;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_pages_clamped_to_address_space() {
        let c = Config::new().with_max_memory_pages(u32::MAX);
        assert_eq!(c.max_memory_pages, MAX_PAGES);
        let c = Config::new().with_max_memory_pages(4);
        assert_eq!(c.max_memory_pages, 4);
    }
}
