//! The encoded form of one call: the bytes an envelope (or a run of chunks)
//! carries.
//!
//! ```text
//! [param_count: i32][param 0][param 1]...
//! ```
//!
//! The parameter count travels with the body because the receiver needs it
//! to pick the right overload out of the function registry.

use crate::{ProtocolError, Reader, Value, Writer};

/// Encodes a parameter list into a call body.
pub fn encode_call(params: &[Value]) -> Result<Vec<u8>, ProtocolError> {
    let count = i32::try_from(params.len()).map_err(|_| {
        ProtocolError::InvalidMessage(format!("{} parameters is too many", params.len()))
    })?;

    let mut w = Writer::new();
    w.write_i32(count);
    for param in params {
        param.write_to(&mut w)?;
    }
    Ok(w.into_bytes())
}

/// Opens a call body: reads the parameter count and returns a reader
/// positioned at the first parameter.
pub fn open_call(body: &[u8]) -> Result<(usize, Reader<'_>), ProtocolError> {
    let mut r = Reader::new(body);
    let count = r.read_i32()?;
    let count = usize::try_from(count).map_err(|_| {
        ProtocolError::InvalidMessage(format!("negative parameter count: {count}"))
    })?;
    Ok((count, r))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_call_prefixes_param_count() {
        let body = encode_call(&["hello".into(), 42i32.into()]).unwrap();
        let (count, mut r) = open_call(&body).unwrap();

        assert_eq!(count, 2);
        assert_eq!(r.read_string().unwrap(), "hello");
        assert_eq!(r.read_i32().unwrap(), 42);
        assert!(r.is_empty());
    }

    #[test]
    fn test_encode_call_with_no_params() {
        let body = encode_call(&[]).unwrap();
        assert_eq!(body, 0i32.to_le_bytes());
    }

    #[test]
    fn test_open_call_empty_body_is_truncated() {
        let result = open_call(&[]);
        assert!(matches!(result, Err(ProtocolError::Truncated { .. })));
    }

    #[test]
    fn test_open_call_negative_count_is_invalid() {
        let bytes = (-3i32).to_le_bytes();
        let result = open_call(&bytes);
        assert!(matches!(result, Err(ProtocolError::InvalidMessage(_))));
    }
}
