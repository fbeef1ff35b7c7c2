//! Parser for the IDX binary files MNIST is distributed in.
//!
//! # IDX3 image file layout
//! ```text
//! bytes  0-1:   0x00 0x00   (reserved, must be zero)
//! byte   2:     0x08        (dtype = uint8)
//! byte   3:     0x03        (number of dimensions = 3)
//! bytes  4-7:   N           (number of images, big-endian u32)
//! bytes  8-11:  rows        (image height in pixels, big-endian u32)
//! bytes 12-15:  cols        (image width in pixels, big-endian u32)
//! bytes 16..:   N * rows * cols bytes, row-major, uint8
//! ```
//!
//! # IDX1 label file layout
//! ```text
//! bytes  0-1:   0x00 0x00   (reserved, must be zero)
//! byte   2:     0x08        (dtype = uint8)
//! byte   3:     0x01        (number of dimensions = 1)
//! bytes  4-7:   N           (number of labels, big-endian u32)
//! bytes  8..:   N bytes, each a class index
//! ```

use crate::error::{RbmError, Result};
use crate::math::matrix::Matrix;

fn be_u32(bytes: &[u8], at: usize) -> usize {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]) as usize
}

fn check_header(bytes: &[u8], dims: u8, min_len: usize, what: &str) -> Result<()> {
    if bytes.len() < min_len {
        return Err(RbmError::InvalidIdx(format!(
            "{} file too short: expected at least {} header bytes, got {}",
            what,
            min_len,
            bytes.len()
        )));
    }
    if bytes[0] != 0x00 || bytes[1] != 0x00 {
        return Err(RbmError::InvalidIdx(format!(
            "{} file: bytes 0-1 must be 0x00 0x00, got 0x{:02X} 0x{:02X}",
            what, bytes[0], bytes[1]
        )));
    }
    if bytes[2] != 0x08 {
        return Err(RbmError::InvalidIdx(format!(
            "{} file: dtype must be 0x08 (uint8), got 0x{:02X}",
            what, bytes[2]
        )));
    }
    if bytes[3] != dims {
        return Err(RbmError::InvalidIdx(format!(
            "{} file: expected {} dimensions, got {}",
            what, dims, bytes[3]
        )));
    }
    Ok(())
}

/// Decodes an IDX3 image file into an `N × (rows·cols)` matrix with pixels
/// scaled to [0, 1]. Also returns the image shape `(rows, cols)`.
pub fn parse_images(bytes: &[u8]) -> Result<(Matrix, (usize, usize))> {
    check_header(bytes, 0x03, 16, "IDX image")?;

    let n_items = be_u32(bytes, 4);
    let rows = be_u32(bytes, 8);
    let cols = be_u32(bytes, 12);

    let n_pixels = rows
        .checked_mul(cols)
        .ok_or_else(|| RbmError::InvalidIdx(format!("rows * cols overflows ({}x{})", rows, cols)))?;
    let data_len = n_items
        .checked_mul(n_pixels)
        .ok_or_else(|| RbmError::InvalidIdx("image data length overflows usize".to_owned()))?;

    if bytes.len() < 16 + data_len {
        return Err(RbmError::InvalidIdx(format!(
            "IDX image file too short: header declares {} items of {}x{} pixels \
             but file is only {} bytes",
            n_items,
            rows,
            cols,
            bytes.len()
        )));
    }

    let data = bytes[16..16 + data_len].iter().map(|&px| px as f64 / 255.0).collect();
    Ok((Matrix::from_vec(n_items, n_pixels, data), (rows, cols)))
}

/// Decodes an IDX1 label file.
pub fn parse_labels(bytes: &[u8]) -> Result<Vec<usize>> {
    check_header(bytes, 0x01, 8, "IDX label")?;
    let n_items = be_u32(bytes, 4);
    if bytes.len() < 8 + n_items {
        return Err(RbmError::InvalidIdx(format!(
            "IDX label file too short: header declares {} labels but file is only {} bytes",
            n_items,
            bytes.len()
        )));
    }
    Ok(bytes[8..8 + n_items].iter().map(|&c| c as usize).collect())
}

/// Parses a matching image/label pair and checks that their counts agree.
pub fn parse_idx_pair(image_bytes: &[u8], label_bytes: &[u8]) -> Result<(Matrix, Vec<usize>)> {
    let (images, _) = parse_images(image_bytes)?;
    let labels = parse_labels(label_bytes)?;
    if images.rows != labels.len() {
        return Err(RbmError::InvalidIdx(format!(
            "image file declares {} items but label file declares {}",
            images.rows,
            labels.len()
        )));
    }
    Ok((images, labels))
}

/// Encodes images (values in [0, 1]) and labels as an IDX pair. Used to
/// write small fixture datasets.
pub fn encode_idx_pair(images: &Matrix, shape: (usize, usize), labels: &[usize]) -> (Vec<u8>, Vec<u8>) {
    assert_eq!(shape.0 * shape.1, images.cols, "shape does not match image width");
    assert_eq!(images.rows, labels.len(), "one label per image");

    let mut image_bytes = vec![0x00, 0x00, 0x08, 0x03];
    for n in [images.rows, shape.0, shape.1] {
        image_bytes.extend_from_slice(&(n as u32).to_be_bytes());
    }
    image_bytes.extend(images.data.iter().map(|&x| (x.clamp(0.0, 1.0) * 255.0).round() as u8));

    let mut label_bytes = vec![0x00, 0x00, 0x08, 0x01];
    label_bytes.extend_from_slice(&(labels.len() as u32).to_be_bytes());
    label_bytes.extend(labels.iter().map(|&l| l as u8));

    (image_bytes, label_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_what_it_encodes() {
        let images = Matrix::from_data(vec![vec![0.0, 1.0, 1.0, 0.0], vec![1.0, 1.0, 0.0, 0.0]]);
        let (ib, lb) = encode_idx_pair(&images, (2, 2), &[3, 7]);
        let (decoded, labels) = parse_idx_pair(&ib, &lb).unwrap();
        assert_eq!(decoded, images);
        assert_eq!(labels, vec![3, 7]);
    }

    #[test]
    fn rejects_wrong_dimension_byte() {
        let bytes = [0x00, 0x00, 0x08, 0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(matches!(parse_images(&bytes), Err(RbmError::InvalidIdx(_))));
    }

    #[test]
    fn rejects_truncated_pixels() {
        let images = Matrix::filled(2, 4, 0.5);
        let (ib, _) = encode_idx_pair(&images, (2, 2), &[0, 1]);
        assert!(parse_images(&ib[..ib.len() - 1]).is_err());
    }

    #[test]
    fn rejects_count_mismatch() {
        let images = Matrix::filled(2, 4, 0.5);
        let (ib, _) = encode_idx_pair(&images, (2, 2), &[0, 1]);
        let (_, lb) = encode_idx_pair(&Matrix::filled(1, 4, 0.5), (2, 2), &[0]);
        assert!(parse_idx_pair(&ib, &lb).is_err());
    }
}
