//! MNIST IDX file loader.
//!
//! Image files (`idx3`) start with a 16-byte header: magic, count, rows, cols,
//! each a big-endian `u32`, followed by `count * rows * cols` unsigned bytes.
//! Label files (`idx1`) start with an 8-byte header: magic, count, followed by
//! `count` bytes.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use tracing::debug;

use crate::{Dataset, Error, Result};

pub const IMAGE_MAGIC: u32 = 0x0000_0803;
pub const LABEL_MAGIC: u32 = 0x0000_0801;

pub const WIDTH: usize = 28;
pub const HEIGHT: usize = 28;
pub const NUM_CLASSES: usize = 10;

const IMAGE_HEADER_LEN: usize = 16;
const LABEL_HEADER_LEN: usize = 8;

const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

/// Which half of the MNIST distribution to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    /// Standard `(images, labels)` file names for this split.
    pub fn file_names(self) -> (&'static str, &'static str) {
        match self {
            Split::Train => (TRAIN_IMAGES, TRAIN_LABELS),
            Split::Test => (TEST_IMAGES, TEST_LABELS),
        }
    }
}

/// Decoded image file: raw pixels plus geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImages {
    pub count: usize,
    pub rows: usize,
    pub cols: usize,
    /// `count * rows * cols` bytes, row-major per image.
    pub pixels: Vec<u8>,
}

/// Load one split from `dir` using the standard MNIST file names.
pub fn load_mnist_split<P: AsRef<Path>>(dir: P, split: Split) -> Result<Dataset> {
    let (images, labels) = split.file_names();
    let dir = dir.as_ref();
    load_mnist(dir.join(images), dir.join(labels))
}

/// Load an image/label file pair into a dataset.
///
/// Pixels are normalized to `[0, 1]` by dividing by 255; labels are one-hot
/// encoded over [`NUM_CLASSES`]. Fails with `InvalidData` on a bad magic number,
/// a truncated stream, mismatched counts or an out-of-range label.
pub fn load_mnist<P: AsRef<Path>, Q: AsRef<Path>>(images: P, labels: Q) -> Result<Dataset> {
    let images_path = images.as_ref();
    let labels_path = labels.as_ref();

    let raw = parse_images(&read_file(images_path)?)?;
    let labels = parse_labels(&read_file(labels_path)?)?;

    if raw.count != labels.len() {
        return Err(Error::InvalidData(format!(
            "{} holds {} images but {} holds {} labels",
            images_path.display(),
            raw.count,
            labels_path.display(),
            labels.len()
        )));
    }

    let input_dim = raw.rows * raw.cols;
    let inputs = raw.pixels.iter().map(|&p| f64::from(p) / 255.0).collect();
    let data = Dataset::from_labels(inputs, &labels, input_dim, NUM_CLASSES)?;

    debug!(
        images = %images_path.display(),
        samples = data.len(),
        rows = raw.rows,
        cols = raw.cols,
        "loaded idx dataset"
    );
    Ok(data)
}

/// Parse an in-memory `idx3` image file.
pub fn parse_images(bytes: &[u8]) -> Result<RawImages> {
    if bytes.len() < IMAGE_HEADER_LEN {
        return Err(Error::InvalidData(format!(
            "image file truncated: {} bytes, header needs {IMAGE_HEADER_LEN}",
            bytes.len()
        )));
    }

    let magic = be_u32(bytes, 0);
    if magic != IMAGE_MAGIC {
        return Err(Error::InvalidData(format!(
            "bad image magic {magic:#010x}, expected {IMAGE_MAGIC:#010x}"
        )));
    }
    let count = be_u32(bytes, 4) as usize;
    let rows = be_u32(bytes, 8) as usize;
    let cols = be_u32(bytes, 12) as usize;

    let expected = count
        .checked_mul(rows)
        .and_then(|v| v.checked_mul(cols))
        .ok_or_else(|| Error::InvalidData("image file dimensions overflow".to_owned()))?;
    let body = &bytes[IMAGE_HEADER_LEN..];
    if body.len() < expected {
        return Err(Error::InvalidData(format!(
            "image file truncated: header declares {count} images of {rows}x{cols} \
             ({expected} bytes) but only {} bytes follow",
            body.len()
        )));
    }

    Ok(RawImages {
        count,
        rows,
        cols,
        pixels: body[..expected].to_vec(),
    })
}

/// Parse an in-memory `idx1` label file.
pub fn parse_labels(bytes: &[u8]) -> Result<Vec<u8>> {
    if bytes.len() < LABEL_HEADER_LEN {
        return Err(Error::InvalidData(format!(
            "label file truncated: {} bytes, header needs {LABEL_HEADER_LEN}",
            bytes.len()
        )));
    }

    let magic = be_u32(bytes, 0);
    if magic != LABEL_MAGIC {
        return Err(Error::InvalidData(format!(
            "bad label magic {magic:#010x}, expected {LABEL_MAGIC:#010x}"
        )));
    }
    let count = be_u32(bytes, 4) as usize;

    let body = &bytes[LABEL_HEADER_LEN..];
    if body.len() < count {
        return Err(Error::InvalidData(format!(
            "label file truncated: header declares {count} labels but only {} bytes follow",
            body.len()
        )));
    }

    Ok(body[..count].to_vec())
}

/// Read the raw pixels of the image at `index` without loading the whole file.
pub fn read_raw_image<P: AsRef<Path>>(path: P, index: usize) -> Result<RawImages> {
    let path = path.as_ref();
    let mut f = File::open(path).map_err(|e| Error::io(path, e))?;

    let mut header = [0u8; IMAGE_HEADER_LEN];
    read_exact(&mut f, &mut header, path, "image header")?;
    let magic = be_u32(&header, 0);
    if magic != IMAGE_MAGIC {
        return Err(Error::InvalidData(format!(
            "bad image magic {magic:#010x}, expected {IMAGE_MAGIC:#010x}"
        )));
    }
    let count = be_u32(&header, 4) as usize;
    let rows = be_u32(&header, 8) as usize;
    let cols = be_u32(&header, 12) as usize;
    if index >= count {
        return Err(Error::InvalidData(format!(
            "image index {index} out of range, file holds {count} images"
        )));
    }

    let overflow = || {
        Error::InvalidData(format!("{}: image dimensions overflow", path.display()))
    };
    let size = rows.checked_mul(cols).ok_or_else(overflow)?;
    let offset = index
        .checked_mul(size)
        .and_then(|v| v.checked_add(IMAGE_HEADER_LEN))
        .ok_or_else(overflow)?;
    let end = offset.checked_add(size).ok_or_else(overflow)?;

    let file_len = f.metadata().map_err(|e| Error::io(path, e))?.len();
    if end as u64 > file_len {
        return Err(Error::InvalidData(format!(
            "{}: truncated image {index}, needs {end} bytes but file holds {file_len}",
            path.display()
        )));
    }

    f.seek(SeekFrom::Start(offset as u64))
        .map_err(|e| Error::io(path, e))?;
    let mut pixels = vec![0u8; size];
    read_exact(&mut f, &mut pixels, path, "image pixels")?;

    Ok(RawImages {
        count: 1,
        rows,
        cols,
        pixels,
    })
}

/// Read the label at `index` without loading the whole file.
pub fn read_label<P: AsRef<Path>>(path: P, index: usize) -> Result<u8> {
    let path = path.as_ref();
    let mut f = File::open(path).map_err(|e| Error::io(path, e))?;

    let mut header = [0u8; LABEL_HEADER_LEN];
    read_exact(&mut f, &mut header, path, "label header")?;
    let magic = be_u32(&header, 0);
    if magic != LABEL_MAGIC {
        return Err(Error::InvalidData(format!(
            "bad label magic {magic:#010x}, expected {LABEL_MAGIC:#010x}"
        )));
    }
    let count = be_u32(&header, 4) as usize;
    if index >= count {
        return Err(Error::InvalidData(format!(
            "label index {index} out of range, file holds {count} labels"
        )));
    }

    f.seek(SeekFrom::Start((LABEL_HEADER_LEN + index) as u64))
        .map_err(|e| Error::io(path, e))?;
    let mut label = [0u8; 1];
    read_exact(&mut f, &mut label, path, "label")?;
    Ok(label[0])
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| Error::io(path, e))
}

fn read_exact(f: &mut File, buf: &mut [u8], path: &Path, what: &str) -> Result<()> {
    f.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::InvalidData(format!("{}: truncated {what}", path.display()))
        } else {
            Error::io(path, e)
        }
    })
}

#[inline]
fn be_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Encode images in `idx3` format. Used to build fixtures.
pub fn encode_images(rows: usize, cols: usize, pixels: &[u8]) -> Vec<u8> {
    let count = pixels.len() / (rows * cols);
    let mut out = Vec::with_capacity(IMAGE_HEADER_LEN + pixels.len());
    for v in [IMAGE_MAGIC, count as u32, rows as u32, cols as u32] {
        out.extend_from_slice(&v.to_be_bytes());
    }
    out.extend_from_slice(pixels);
    out
}

/// Encode labels in `idx1` format. Used to build fixtures.
pub fn encode_labels(labels: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(LABEL_HEADER_LEN + labels.len());
    for v in [LABEL_MAGIC, labels.len() as u32] {
        out.extend_from_slice(&v.to_be_bytes());
    }
    out.extend_from_slice(labels);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_images_reads_header_and_body() {
        let bytes = encode_images(2, 2, &[0, 255, 10, 20, 1, 2, 3, 4]);
        let raw = parse_images(&bytes).unwrap();
        assert_eq!((raw.count, raw.rows, raw.cols), (2, 2, 2));
        assert_eq!(raw.pixels, vec![0, 255, 10, 20, 1, 2, 3, 4]);
    }

    #[test]
    fn parse_images_rejects_bad_magic() {
        let mut bytes = encode_images(1, 1, &[0]);
        bytes[3] = 0x01;
        assert!(matches!(parse_images(&bytes), Err(Error::InvalidData(_))));
    }

    #[test]
    fn parse_images_rejects_truncated_body() {
        let mut bytes = encode_images(2, 2, &[0; 8]);
        bytes.truncate(bytes.len() - 1);
        let err = parse_images(&bytes).unwrap_err();
        assert!(format!("{err}").contains("truncated"));
    }

    #[test]
    fn parse_labels_rejects_short_header_and_body() {
        assert!(parse_labels(&[0, 0, 8]).is_err());

        let mut bytes = encode_labels(&[1, 2, 3]);
        bytes.pop();
        assert!(parse_labels(&bytes).is_err());

        assert_eq!(parse_labels(&encode_labels(&[7, 3])).unwrap(), vec![7, 3]);
    }

    #[test]
    fn read_raw_image_rejects_oversized_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge-idx3-ubyte");
        let mut header = Vec::new();
        for v in [IMAGE_MAGIC, 3, u32::MAX, u32::MAX] {
            header.extend_from_slice(&v.to_be_bytes());
        }
        std::fs::write(&path, header).unwrap();

        for index in 0..3 {
            let err = read_raw_image(&path, index).unwrap_err();
            assert!(matches!(err, Error::InvalidData(_)), "index {index}: {err}");
        }
    }

    #[test]
    fn read_raw_image_checks_length_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short-idx3-ubyte");
        let mut bytes = encode_images(65_536, 65_536, &[]);
        bytes[4..8].copy_from_slice(&1u32.to_be_bytes());
        std::fs::write(&path, bytes).unwrap();

        let err = read_raw_image(&path, 0).unwrap_err();
        assert!(format!("{err}").contains("truncated"), "{err}");
    }

    #[test]
    fn split_file_names() {
        assert_eq!(
            Split::Test.file_names(),
            ("t10k-images-idx3-ubyte", "t10k-labels-idx1-ubyte")
        );
    }
}
