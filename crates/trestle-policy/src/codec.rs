//! Text encoding of flat parameter vectors.
//!
//! Weights travel as standard (padded) base64 of the little-endian IEEE-754
//! `f32` bytes, in the order produced by
//! [`PolicyNetwork::flat_weights`](crate::network::PolicyNetwork::flat_weights).
//! The same payload is used for checkpoint rows and for local weight files, so
//! surrounding whitespace is tolerated on decode.

use base64::{Engine as _, engine::general_purpose::STANDARD};

const F32_SIZE: usize = size_of::<f32>();

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum DecodeWeightsError {
    #[display("weight payload is not valid base64: {_0}")]
    Base64(base64::DecodeError),
    #[display("weight payload has {len} bytes, which is not a multiple of 4")]
    Length { len: usize },
}

/// Encodes weights into their transport string.
#[must_use]
pub fn encode_weights(weights: &[f32]) -> String {
    let bytes = weights
        .iter()
        .flat_map(|w| w.to_le_bytes())
        .collect::<Vec<u8>>();
    STANDARD.encode(bytes)
}

/// Decodes a transport string back into weights.
///
/// The decoded length is not checked against any network shape; that is the
/// job of [`PolicyNetwork::set_flat_weights`](crate::network::PolicyNetwork::set_flat_weights).
pub fn decode_weights(text: &str) -> Result<Vec<f32>, DecodeWeightsError> {
    let bytes = STANDARD
        .decode(text.trim())
        .map_err(DecodeWeightsError::Base64)?;
    if bytes.len() % F32_SIZE != 0 {
        return Err(DecodeWeightsError::Length { len: bytes.len() });
    }
    Ok(bytes
        .chunks_exact(F32_SIZE)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
