use std::{
    fs::File,
    io,
    io::{ErrorKind, Read, Write},
    path::Path,
};

use bincode::{Decode, Encode};

/// Serialize a value to a file using bincode's standard configuration.
pub fn save<T: Encode>(path: &Path, data: &T) -> io::Result<()> {
    let encoded = bincode::encode_to_vec(data, bincode::config::standard())
        .map_err(|e| io::Error::new(ErrorKind::InvalidData, e.to_string()))?;

    let mut file = File::create(path)?;
    file.write_all(&encoded)?;
    Ok(())
}

/// Deserialize a value previously written with `save`.
pub fn load<T: Decode<()>>(path: &Path) -> io::Result<T> {
    let mut file = File::open(path)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;

    let (decoded, _len) = bincode::decode_from_slice(&buf, bincode::config::standard())
        .map_err(|e| io::Error::new(ErrorKind::InvalidData, e.to_string()))?;

    Ok(decoded)
}

/// Mean of a float slice; 0 for empty input.
pub fn mean(vals: &[f32]) -> f32 {
    if vals.is_empty() {
        return 0.;
    }
    vals.iter().sum::<f32>() / vals.len() as f32
}
