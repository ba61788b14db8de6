//! Directory of TIFF slices → 5-D stack.
//!
//! Every `*.tif`/`*.tiff` file is one time point, in file-name order. Pages
//! of a multi-page file become Z; samples per pixel become C.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use ndarray::{Array4, Axis};
use tiff::decoder::{Decoder, DecodingResult, Limits};

use super::{LoadError, SampleType};
use crate::stack::Stack;

/// Slice files in `dir`, sorted by file name.
pub fn list_slices(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let mut files = Vec::new();
    for pattern in ["*.tif", "*.tiff"] {
        let full = dir.join(pattern);
        let entries = glob::glob(&full.to_string_lossy()).map_err(|e| LoadError::Malformed {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        files.extend(entries.filter_map(Result::ok));
    }
    files.sort();
    Ok(files)
}

fn decoded_samples(result: DecodingResult) -> Option<(Vec<f64>, SampleType)> {
    #[allow(unreachable_patterns)]
    let out = match result {
        DecodingResult::U8(d) => (d.into_iter().map(f64::from).collect(), SampleType::U8),
        DecodingResult::U16(d) => (d.into_iter().map(f64::from).collect(), SampleType::U16),
        DecodingResult::U32(d) => (d.into_iter().map(f64::from).collect(), SampleType::U32),
        DecodingResult::U64(d) => (d.into_iter().map(|v| v as f64).collect(), SampleType::U64),
        DecodingResult::I8(d) => (d.into_iter().map(f64::from).collect(), SampleType::I8),
        DecodingResult::I16(d) => (d.into_iter().map(f64::from).collect(), SampleType::I16),
        DecodingResult::I32(d) => (d.into_iter().map(f64::from).collect(), SampleType::I32),
        DecodingResult::I64(d) => (d.into_iter().map(|v| v as f64).collect(), SampleType::I64),
        DecodingResult::F32(d) => (d.into_iter().map(f64::from).collect(), SampleType::F32),
        DecodingResult::F64(d) => (d, SampleType::F64),
        _ => return None,
    };
    Some(out)
}

fn decode_page(
    decoder: &mut Decoder<BufReader<File>>,
    path: &Path,
) -> Result<(Vec<f64>, SampleType), LoadError> {
    let malformed = |reason: String| LoadError::Malformed {
        path: path.to_path_buf(),
        reason,
    };
    let page = decoder.read_image().map_err(|e| malformed(e.to_string()))?;
    decoded_samples(page).ok_or_else(|| malformed("unsupported sample format".into()))
}

/// Decode one slice file as `[Y, X, Z, C]`.
fn read_slice(path: &Path) -> Result<(Array4<f64>, SampleType), LoadError> {
    let malformed = |reason: String| LoadError::Malformed {
        path: path.to_path_buf(),
        reason,
    };
    let file = File::open(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut decoder = Decoder::new(BufReader::new(file))
        .map_err(|e| malformed(e.to_string()))?
        .with_limits(Limits::unlimited());
    let (width, height) = decoder.dimensions().map_err(|e| malformed(e.to_string()))?;
    let (rows, cols) = (height as usize, width as usize);

    let (first_page, dtype) = decode_page(&mut decoder, path)?;
    let mut pages = vec![first_page];
    while decoder.more_images() {
        decoder.next_image().map_err(|e| malformed(e.to_string()))?;
        let (samples, ty) = decode_page(&mut decoder, path)?;
        if ty != dtype {
            return Err(malformed(format!(
                "page {} holds {ty:?} samples, the first page {dtype:?}",
                pages.len()
            )));
        }
        pages.push(samples);
    }

    let pixels = rows * cols;
    let first = pages[0].len();
    if pixels == 0 || first % pixels != 0 || pages.iter().any(|p| p.len() != first) {
        return Err(malformed(format!(
            "pages do not tile a {rows}x{cols} image consistently"
        )));
    }
    let channels = first / pixels;
    let depth = pages.len();
    let mut slab = Array4::<f64>::zeros((rows, cols, depth, channels));
    for (z, page) in pages.iter().enumerate() {
        // Interleaved pixel-major samples: [(y * cols + x) * channels + c].
        for (i, &v) in page.iter().enumerate() {
            let c = i % channels;
            let pixel = i / channels;
            slab[[pixel / cols, pixel % cols, z, c]] = v;
        }
    }
    Ok((slab, dtype))
}

/// Load a directory of slices, stacking them along T.
pub fn read_tiff_dir(dir: &Path) -> Result<(Stack, SampleType), LoadError> {
    let files = list_slices(dir)?;
    if files.is_empty() {
        return Err(LoadError::EmptyDirectory(dir.to_path_buf()));
    }
    let mut slabs: Vec<Array4<f64>> = Vec::with_capacity(files.len());
    let mut dtype = SampleType::F64;
    for path in &files {
        let (slab, ty) = read_slice(path)?;
        if let Some(first) = slabs.first() {
            if ty != dtype {
                return Err(LoadError::Malformed {
                    path: path.clone(),
                    reason: format!("slice holds {ty:?} samples, the first slice {dtype:?}"),
                });
            }
            if first.dim() != slab.dim() {
                return Err(LoadError::Malformed {
                    path: path.clone(),
                    reason: format!(
                        "slice shape {:?} differs from the first slice {:?}",
                        slab.dim(),
                        first.dim()
                    ),
                });
            }
        }
        if slabs.is_empty() {
            dtype = ty;
        }
        slabs.push(slab);
    }
    let views: Vec<_> = slabs.iter().map(|s| s.view().insert_axis(Axis(4))).collect();
    let stack = ndarray::concatenate(Axis(4), &views).map_err(|e| LoadError::Malformed {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok((stack, dtype))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tiff::encoder::{colortype, TiffEncoder};

    fn write_gray16(path: &Path, width: u32, height: u32, value: u16) {
        let file = File::create(path).unwrap();
        let mut enc = TiffEncoder::new(file).unwrap();
        let data: Vec<u16> = (0..width * height).map(|i| value + i as u16).collect();
        enc.write_image::<colortype::Gray16>(width, height, &data)
            .unwrap();
    }

    #[test]
    fn slices_stack_along_time_in_name_order() {
        let dir = tempdir().unwrap();
        write_gray16(&dir.path().join("b_001.tif"), 4, 3, 100);
        write_gray16(&dir.path().join("a_000.tiff"), 4, 3, 0);
        write_gray16(&dir.path().join("c_002.tif"), 4, 3, 200);
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let (stack, dtype) = read_tiff_dir(dir.path()).unwrap();
        assert_eq!(dtype, SampleType::U16);
        assert_eq!(stack.dim(), (3, 4, 1, 1, 3));
        assert_eq!(stack[[0, 0, 0, 0, 0]], 0.0);
        assert_eq!(stack[[0, 0, 0, 0, 1]], 100.0);
        assert_eq!(stack[[2, 3, 0, 0, 2]], 211.0);
    }

    #[test]
    fn mixed_sample_types_are_malformed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t_000.tif");
        let mut enc = TiffEncoder::new(File::create(&path).unwrap()).unwrap();
        enc.write_image::<colortype::Gray8>(2, 2, &[1, 2, 3, 4]).unwrap();
        enc.write_image::<colortype::Gray16>(2, 2, &[1, 2, 3, 4]).unwrap();
        drop(enc);
        assert!(matches!(
            read_tiff_dir(dir.path()),
            Err(LoadError::Malformed { .. })
        ));

        let dir = tempdir().unwrap();
        write_gray16(&dir.path().join("t_000.tif"), 2, 2, 0);
        let mut enc = TiffEncoder::new(File::create(dir.path().join("t_001.tif")).unwrap()).unwrap();
        enc.write_image::<colortype::Gray8>(2, 2, &[1, 2, 3, 4]).unwrap();
        drop(enc);
        match read_tiff_dir(dir.path()) {
            Err(LoadError::Malformed { path, .. }) => assert!(path.ends_with("t_001.tif")),
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            read_tiff_dir(dir.path()),
            Err(LoadError::EmptyDirectory(_))
        ));
    }
}
