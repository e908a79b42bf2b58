//! Minimal NPY (format 1.0) support for float64 arrays.
//!
//! Writes little-endian `<f8` arrays in C order, readable by `numpy.load`.

use crate::error::{Result, SrcRecError};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::{Array, ArrayBase, ArrayD, Data, Dimension, IxDyn};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const MAGIC: &[u8; 6] = b"\x93NUMPY";
const VERSION: [u8; 2] = [1, 0];
/// Magic, version and header-length prefix.
const PREAMBLE_LEN: usize = 10;
const ALIGNMENT: usize = 64;

fn header_dict(shape: &[usize]) -> String {
    let dims = match shape {
        [] => String::new(),
        [n] => format!("{},", n),
        _ => shape
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(", "),
    };
    let mut header = format!(
        "{{'descr': '<f8', 'fortran_order': False, 'shape': ({}), }}",
        dims
    );
    // Pad with spaces so the data starts on an aligned offset; header ends in '\n'.
    let unpadded = PREAMBLE_LEN + header.len() + 1;
    let padding = (ALIGNMENT - unpadded % ALIGNMENT) % ALIGNMENT;
    header.extend(std::iter::repeat(' ').take(padding));
    header.push('\n');
    header
}

/// Serialize an array into any writer.
pub fn write_npy_to<W, S, D>(mut writer: W, array: &ArrayBase<S, D>) -> std::io::Result<()>
where
    W: Write,
    S: Data<Elem = f64>,
    D: Dimension,
{
    let header = header_dict(array.shape());
    writer.write_all(MAGIC)?;
    writer.write_all(&VERSION)?;
    writer.write_u16::<LittleEndian>(header.len() as u16)?;
    writer.write_all(header.as_bytes())?;
    // Logical (row-major) iteration order, independent of memory layout.
    for &value in array.iter() {
        writer.write_f64::<LittleEndian>(value)?;
    }
    writer.flush()
}

/// Write an array to `path`, replacing any existing file.
pub fn write_npy<S, D>(path: &Path, array: &ArrayBase<S, D>) -> Result<()>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    let file = File::create(path).map_err(|e| SrcRecError::output_write(path, e))?;
    write_npy_to(BufWriter::new(file), array).map_err(|e| SrcRecError::output_write(path, e))
}

/// Parse the header of an NPY stream, returning the shape.
fn read_header<R: Read>(reader: &mut R) -> Result<Vec<usize>> {
    let mut magic = [0u8; 6];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(SrcRecError::MalformedInput("Not an NPY file".to_string()));
    }
    let major = reader.read_u8()?;
    let _minor = reader.read_u8()?;
    let header_len = match major {
        1 => reader.read_u16::<LittleEndian>()? as usize,
        2 | 3 => reader.read_u32::<LittleEndian>()? as usize,
        v => {
            return Err(SrcRecError::MalformedInput(format!(
                "Unsupported NPY version {}",
                v
            )))
        }
    };
    let mut header = vec![0u8; header_len];
    reader.read_exact(&mut header)?;
    let header = String::from_utf8_lossy(&header);

    if !header.contains("'descr': '<f8'") {
        return Err(SrcRecError::MalformedInput(format!(
            "Only little-endian float64 arrays are supported: {}",
            header.trim()
        )));
    }
    if header.contains("'fortran_order': True") {
        return Err(SrcRecError::MalformedInput(
            "Fortran-ordered arrays are not supported".to_string(),
        ));
    }

    let start = header
        .find("'shape': (")
        .map(|i| i + "'shape': (".len())
        .ok_or_else(|| SrcRecError::MalformedInput("NPY header has no shape".to_string()))?;
    let end = header[start..]
        .find(')')
        .map(|i| start + i)
        .ok_or_else(|| SrcRecError::MalformedInput("Unterminated NPY shape".to_string()))?;

    header[start..end]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| SrcRecError::MalformedInput(format!("Bad NPY dimension '{}'", s)))
        })
        .collect()
}

/// Read an `<f8` NPY file into a dynamically shaped array.
pub fn read_npy(path: &Path) -> Result<ArrayD<f64>> {
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SrcRecError::missing("array file", path)
        } else {
            SrcRecError::IoError(e)
        }
    })?;
    let mut reader = BufReader::new(file);
    let shape = read_header(&mut reader)?;
    let len: usize = shape.iter().product();
    let mut values = vec![0f64; len];
    reader
        .read_f64_into::<LittleEndian>(&mut values)
        .map_err(|e| SrcRecError::MalformedInput(format!("Truncated NPY data: {}", e)))?;
    Array::from_shape_vec(IxDyn(&shape), values)
        .map_err(|e| SrcRecError::MalformedInput(format!("Inconsistent NPY shape: {}", e)))
}
