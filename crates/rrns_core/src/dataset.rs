//! Dataset input
//!
//! Reads a text file of whitespace-separated numeric tokens until
//! end-of-stream. Integer tokens parse directly; floating tokens are
//! truncated toward zero, so the integer and real dataset variants feed
//! the same sample path.

use std::fs;
use std::path::Path;

use crate::error::DatasetError;

/// Read all samples from a dataset file.
pub fn read_dataset<P: AsRef<Path>>(path: P) -> Result<Vec<i64>, DatasetError> {
    let text = fs::read_to_string(path)?;
    parse_dataset(&text)
}

/// Parse whitespace-separated numeric tokens.
pub fn parse_dataset(text: &str) -> Result<Vec<i64>, DatasetError> {
    let mut samples = Vec::new();

    for (position, token) in text.split_whitespace().enumerate() {
        let value = match token.parse::<i64>() {
            Ok(v) => v,
            Err(_) => match token.parse::<f64>() {
                Ok(f) if f.is_finite() => f.trunc() as i64,
                _ => {
                    return Err(DatasetError::BadToken {
                        token: token.to_owned(),
                        position,
                    })
                }
            },
        };
        samples.push(value);
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_integers() {
        let samples = parse_dataset("28 13\n41\t7  ").unwrap();
        assert_eq!(samples, vec![28, 13, 41, 7]);
    }

    #[test]
    fn test_parse_floats_truncate_toward_zero() {
        let samples = parse_dataset("3.9 -2.7 0.1").unwrap();
        assert_eq!(samples, vec![3, -2, 0]);
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_dataset("").unwrap().is_empty());
        assert!(parse_dataset("  \n\t ").unwrap().is_empty());
    }

    #[test]
    fn test_bad_token_reported_with_position() {
        let err = parse_dataset("1 2 three").unwrap_err();
        assert!(matches!(
            err,
            DatasetError::BadToken { ref token, position: 2 } if token == "three"
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            read_dataset("/definitely/not/here.txt"),
            Err(DatasetError::Io(_))
        ));
    }
}
