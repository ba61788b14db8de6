//! NumPy `.npy` reading and streaming writing.
//!
//! Reading maps the file and decodes every sample to f64, remembering the
//! source dtype. Writing streams a `RowSource` row by row behind a version 1.0
//! header, so a disk-backed stack is never materialized.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use memmap2::Mmap;
use ndarray::{ArrayD, IxDyn, ShapeBuilder};

use super::LoadError;
use crate::stack::RowSource;

const MAGIC: &[u8] = b"\x93NUMPY";

/// Sample types understood by the reader and writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

impl SampleType {
    /// Size of one sample in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    /// Little-endian NumPy descriptor used when writing.
    pub fn descr(self) -> &'static str {
        match self {
            Self::I8 => "|i1",
            Self::U8 => "|u1",
            Self::I16 => "<i2",
            Self::I32 => "<i4",
            Self::I64 => "<i8",
            Self::U16 => "<u2",
            Self::U32 => "<u4",
            Self::U64 => "<u8",
            Self::F32 => "<f4",
            Self::F64 => "<f8",
        }
    }

    fn parse_descr(descr: &str) -> Option<(Self, Endian)> {
        let (order, code) = descr.split_at(descr.len().min(1));
        let endian = match order {
            "<" | "|" => Endian::Little,
            ">" => Endian::Big,
            "=" if cfg!(target_endian = "little") => Endian::Little,
            "=" => Endian::Big,
            _ => return None,
        };
        let ty = match code {
            "i1" | "b" => Self::I8,
            "u1" | "B" => Self::U8,
            "i2" => Self::I16,
            "i4" => Self::I32,
            "i8" => Self::I64,
            "u2" => Self::U16,
            "u4" => Self::U32,
            "u8" => Self::U64,
            "f4" => Self::F32,
            "f8" => Self::F64,
            _ => return None,
        };
        Some((ty, endian))
    }

    fn decode(self, bytes: &[u8], endian: Endian) -> f64 {
        macro_rules! read {
            ($t:ty, $n:expr) => {{
                let mut buf = [0u8; $n];
                buf.copy_from_slice(bytes);
                match endian {
                    Endian::Little => <$t>::from_le_bytes(buf) as f64,
                    Endian::Big => <$t>::from_be_bytes(buf) as f64,
                }
            }};
        }
        match self {
            Self::I8 => bytes[0] as i8 as f64,
            Self::U8 => bytes[0] as f64,
            Self::I16 => read!(i16, 2),
            Self::I32 => read!(i32, 4),
            Self::I64 => read!(i64, 8),
            Self::U16 => read!(u16, 2),
            Self::U32 => read!(u32, 4),
            Self::U64 => read!(u64, 8),
            Self::F32 => read!(f32, 4),
            Self::F64 => read!(f64, 8),
        }
    }

    /// Append `value` as little-endian bytes; integers are rounded and saturated.
    pub fn encode(self, value: f64, out: &mut Vec<u8>) {
        let v = value.round();
        match self {
            Self::I8 => out.push(v as i8 as u8),
            Self::U8 => out.push(v as u8),
            Self::I16 => out.extend_from_slice(&(v as i16).to_le_bytes()),
            Self::I32 => out.extend_from_slice(&(v as i32).to_le_bytes()),
            Self::I64 => out.extend_from_slice(&(v as i64).to_le_bytes()),
            Self::U16 => out.extend_from_slice(&(v as u16).to_le_bytes()),
            Self::U32 => out.extend_from_slice(&(v as u32).to_le_bytes()),
            Self::U64 => out.extend_from_slice(&(v as u64).to_le_bytes()),
            Self::F32 => out.extend_from_slice(&(value as f32).to_le_bytes()),
            Self::F64 => out.extend_from_slice(&value.to_le_bytes()),
        }
    }
}

/// Parsed header dictionary.
#[derive(Clone, Debug, PartialEq)]
struct NpyHeader {
    dtype: SampleType,
    endian: Endian,
    fortran_order: bool,
    shape: Vec<usize>,
}

fn header_value<'a>(dict: &'a str, key: &str) -> Option<&'a str> {
    let start = dict.find(&format!("'{key}'"))? + key.len() + 2;
    let rest = dict[start..].trim_start().strip_prefix(':')?;
    Some(rest.trim_start())
}

fn parse_header(dict: &str) -> Result<NpyHeader, String> {
    let descr_raw = header_value(dict, "descr").ok_or("missing 'descr'")?;
    let descr = descr_raw
        .strip_prefix('\'')
        .and_then(|s| s.split('\'').next())
        .ok_or("malformed 'descr'")?;
    let (dtype, endian) =
        SampleType::parse_descr(descr).ok_or_else(|| format!("unsupported dtype '{descr}'"))?;

    let fortran_raw = header_value(dict, "fortran_order").ok_or("missing 'fortran_order'")?;
    let fortran_order = if fortran_raw.starts_with("True") {
        true
    } else if fortran_raw.starts_with("False") {
        false
    } else {
        return Err("malformed 'fortran_order'".into());
    };

    let shape_raw = header_value(dict, "shape").ok_or("missing 'shape'")?;
    let inner = shape_raw
        .strip_prefix('(')
        .and_then(|s| s.split(')').next())
        .ok_or("malformed 'shape'")?;
    let shape = inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().map_err(|e| format!("bad extent '{s}': {e}")))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(NpyHeader {
        dtype,
        endian,
        fortran_order,
        shape,
    })
}

/// Split raw file bytes into (header dict, data section).
fn split_file(bytes: &[u8]) -> Result<(&str, &[u8]), String> {
    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err("not an NPY file (bad magic)".into());
    }
    let major = bytes[6];
    let (len, offset) = match major {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err("truncated header".into());
            }
            let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
            (len, 12)
        }
        v => return Err(format!("unsupported NPY version {v}")),
    };
    let end = offset + len;
    if bytes.len() < end {
        return Err("truncated header".into());
    }
    let dict = std::str::from_utf8(&bytes[offset..end]).map_err(|e| e.to_string())?;
    Ok((dict, &bytes[end..]))
}

/// Read an `.npy` file as f64 samples plus the source dtype.
pub fn read_npy(path: &Path) -> Result<(ArrayD<f64>, SampleType), LoadError> {
    let malformed = |reason: String| LoadError::Malformed {
        path: path.to_path_buf(),
        reason,
    };
    let file = File::open(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    // Read-only private mapping of a file we just opened.
    let map = unsafe { Mmap::map(&file)? };
    let (dict, data) = split_file(&map).map_err(malformed)?;
    let header = parse_header(dict).map_err(malformed)?;

    let size = header.dtype.size();
    let needed = header
        .shape
        .iter()
        .try_fold(size, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| malformed(format!("shape {:?} overflows the address space", header.shape)))?;
    if data.len() < needed {
        return Err(malformed(format!(
            "data section holds {} bytes, shape {:?} needs {needed}",
            data.len(),
            header.shape,
        )));
    }
    let samples: Vec<f64> = data[..needed]
        .chunks_exact(size)
        .map(|chunk| header.dtype.decode(chunk, header.endian))
        .collect();

    let dim = IxDyn(&header.shape);
    let array = if header.fortran_order {
        ArrayD::from_shape_vec(dim.f(), samples)
    } else {
        ArrayD::from_shape_vec(dim, samples)
    }
    .map_err(|e| malformed(e.to_string()))?;
    Ok((array.as_standard_layout().into_owned(), header.dtype))
}

fn header_bytes(dtype: SampleType, shape: &[usize]) -> Vec<u8> {
    let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
    let shape_str = if dims.len() == 1 {
        format!("({},)", dims[0])
    } else {
        format!("({})", dims.join(", "))
    };
    let dict = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
        dtype.descr(),
        shape_str
    );
    // Preamble (10 bytes) + dict + newline is padded to a multiple of 64.
    let unpadded = 10 + dict.len() + 1;
    let pad = (64 - unpadded % 64) % 64;
    let header = format!("{}{}\n", dict, " ".repeat(pad));

    let mut out = Vec::with_capacity(10 + header.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    out
}

/// Stream a stack to `path` as a C-ordered 5-D `.npy` array of `dtype`.
pub fn write_npy<S: RowSource + ?Sized>(
    path: &Path,
    src: &S,
    dtype: SampleType,
) -> Result<(), LoadError> {
    let shape = src.shape();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path)?;
    let mut writer = BufWriter::with_capacity(1 << 20, file);
    writer.write_all(&header_bytes(dtype, &shape.dims()))?;

    let mut buf = Vec::with_capacity(shape.row_len() * dtype.size());
    for y in 0..shape.rows {
        let row = src.read_row(y)?;
        buf.clear();
        for &v in row.iter() {
            dtype.encode(v, &mut buf);
        }
        writer.write_all(&buf)?;
    }
    writer.flush()?;
    Ok(())
}
