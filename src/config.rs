//! Configuration for the font engine.

use std::path::PathBuf;

/// Font engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding `<name>.map` encoding tables.
    pub encoding_dir: Option<PathBuf>,

    /// Compress font programs with zlib when writing them.
    pub compress_font_programs: bool,

    /// Maximum subroutine nesting in charstring programs.
    pub max_subr_depth: usize,

    /// Width used when a font carries no missing width of its own.
    pub default_missing_width: u16,

    /// First code of width arrays for simple (8-bit) fonts.
    pub first_char: u8,

    /// Last code of width arrays for simple (8-bit) fonts.
    pub last_char: u8,

    /// Upper bound on passes of a repeating reordering rule.
    pub reordering_max_passes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfig {
    /// Create new configuration with defaults.
    pub fn new() -> Self {
        Self {
            encoding_dir: None,
            compress_font_programs: false,
            max_subr_depth: 10,
            default_missing_width: 600,
            first_char: 32,
            last_char: 255,
            reordering_max_passes: 16,
        }
    }

    /// Set the directory searched for encoding map files.
    pub fn with_encoding_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.encoding_dir = Some(dir.into());
        self
    }

    /// Enable zlib compression of written font programs.
    pub fn with_compression(mut self, enable: bool) -> Self {
        self.compress_font_programs = enable;
        self
    }

    /// Set the maximum subroutine nesting depth.
    pub fn with_max_subr_depth(mut self, depth: usize) -> Self {
        self.max_subr_depth = depth;
        self
    }

    /// Set the fallback missing width.
    pub fn with_default_missing_width(mut self, width: u16) -> Self {
        self.default_missing_width = width;
        self
    }

    /// Set the code range of simple font width arrays.
    pub fn with_char_range(mut self, first: u8, last: u8) -> Self {
        self.first_char = first.min(last);
        self.last_char = last.max(first);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_subr_depth, 10);
        assert_eq!(config.first_char, 32);
        assert_eq!(config.last_char, 255);
        assert!(!config.compress_font_programs);
        assert!(config.encoding_dir.is_none());
    }

    #[test]
    fn test_char_range_is_ordered() {
        let config = EngineConfig::new().with_char_range(200, 40);
        assert_eq!(config.first_char, 40);
        assert_eq!(config.last_char, 200);
    }
}
