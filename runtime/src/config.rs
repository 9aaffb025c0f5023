use bon::bon;

pub const DEFAULT_BLOCK_SIZE: u32 = 1024;
pub const DEFAULT_KERNEL_NAME: &str = "map_kernel";

/// Launch and code generation knobs of one map operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapConfig {
    /// Lanes per block.
    pub block_size: u32,
    /// Entry kernel name; the host trampoline is `<name>_launch`.
    pub kernel_name: String,
    /// Log the rendered translation unit at debug level.
    pub dump_source: bool,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self { block_size: DEFAULT_BLOCK_SIZE, kernel_name: DEFAULT_KERNEL_NAME.to_string(), dump_source: false }
    }
}

#[bon]
impl MapConfig {
    #[builder]
    pub fn builder(
        #[builder(default = DEFAULT_BLOCK_SIZE)] block_size: u32,
        #[builder(into, default = DEFAULT_KERNEL_NAME.to_string())] kernel_name: String,
        #[builder(default = false)] dump_source: bool,
    ) -> Self {
        Self { block_size: block_size.max(1), kernel_name, dump_source }
    }

    /// Configuration from environment variables.
    ///
    /// * `GPUMAP_BLOCK_SIZE` - lanes per block (default: 1024)
    /// * `GPUMAP_KERNEL_NAME` - entry kernel name (default: `map_kernel`)
    /// * `GPUMAP_DUMP_SOURCE` - log generated source if set
    pub fn from_env() -> Self {
        let block_size = std::env::var("GPUMAP_BLOCK_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|b| *b > 0)
            .unwrap_or(DEFAULT_BLOCK_SIZE);
        let kernel_name = std::env::var("GPUMAP_KERNEL_NAME").unwrap_or_else(|_| DEFAULT_KERNEL_NAME.to_string());
        let dump_source = std::env::var("GPUMAP_DUMP_SOURCE").is_ok();
        Self { block_size, kernel_name, dump_source }
    }

    /// `(grid, block)` covering `lanes` lanes.
    pub fn dims(&self, lanes: usize) -> (u32, u32) {
        let block = self.block_size.max(1);
        let grid = lanes.div_ceil(block as usize);
        (u32::try_from(grid).unwrap_or(u32::MAX), block)
    }
}
