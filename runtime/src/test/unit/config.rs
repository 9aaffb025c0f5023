use test_case::test_case;

use crate::config::{DEFAULT_BLOCK_SIZE, DEFAULT_KERNEL_NAME, MapConfig};

#[test]
fn test_builder_defaults_match_default() {
    assert_eq!(MapConfig::builder().build(), MapConfig::default());
    assert_eq!(MapConfig::default().block_size, DEFAULT_BLOCK_SIZE);
    assert_eq!(MapConfig::default().kernel_name, DEFAULT_KERNEL_NAME);
}

#[test]
fn test_builder_overrides() {
    let config = MapConfig::builder().block_size(128).kernel_name("records").dump_source(true).build();
    assert_eq!(config.block_size, 128);
    assert_eq!(config.kernel_name, "records");
    assert!(config.dump_source);
}

#[test]
fn test_zero_block_size_is_clamped() {
    assert_eq!(MapConfig::builder().block_size(0).build().block_size, 1);
}

#[test_case(1, 256, (1, 256); "single lane")]
#[test_case(256, 256, (1, 256); "exact block")]
#[test_case(257, 256, (2, 256); "partial block")]
#[test_case(999, 1024, (1, 1024); "default block")]
#[test_case(0, 64, (0, 64); "no lanes")]
fn test_dims(lanes: usize, block_size: u32, expected: (u32, u32)) {
    let config = MapConfig::builder().block_size(block_size).build();
    assert_eq!(config.dims(lanes), expected);
}
