//! Errors raised while building models or checking their inputs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaeError {
    #[error("Stage mismatch: encoder has {encoder} stages, decoder has {decoder}")]
    StageMismatch { encoder: usize, decoder: usize },

    #[error("Channel schedule from ch_0={ch_0} reaches {reached} channels, expected ch_max={ch_max}")]
    ChannelSchedule {
        ch_0: usize,
        ch_max: usize,
        reached: usize,
    },

    #[error("{channels} bottleneck channels cannot be grouped into {latent_channels} latent channels")]
    LatentGrouping {
        channels: usize,
        latent_channels: usize,
    },

    #[error("Unsupported aspect ratio {height}x{width}: only square and 16:9 are supported")]
    UnsupportedAspect { height: usize, width: usize },

    #[error("Resolution {size} is not divisible by {factor}")]
    Resolution { size: usize, factor: usize },

    #[error("Latent size mismatch: configured {configured}, derived {derived}")]
    LatentSize { configured: usize, derived: usize },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Shape mismatch for {tensor}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        tensor: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VaeError>;

/// Checks every non-batch dimension of `actual` against `expected`
///
/// `expected[0]` is ignored; any batch size is accepted.
pub(crate) fn check_shape<const D: usize>(
    tensor: &'static str,
    expected: [usize; D],
    actual: [usize; D],
) -> Result<()> {
    if expected[1..] == actual[1..] {
        Ok(())
    } else {
        let mut expected = expected.to_vec();
        expected[0] = actual[0];
        Err(VaeError::ShapeMismatch {
            tensor,
            expected,
            actual: actual.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_shape_ignores_batch() {
        assert!(check_shape("image", [1, 3, 64, 64], [7, 3, 64, 64]).is_ok());
    }

    #[test]
    fn test_check_shape_reports_mismatch() {
        let err = check_shape("image", [1, 3, 64, 64], [2, 4, 64, 64]).unwrap_err();
        match err {
            VaeError::ShapeMismatch {
                tensor,
                expected,
                actual,
            } => {
                assert_eq!(tensor, "image");
                assert_eq!(expected, vec![2, 3, 64, 64]);
                assert_eq!(actual, vec![2, 4, 64, 64]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
