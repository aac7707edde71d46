use tracing::debug;

use crate::error::{CaError, Result};

const BEGIN: &[u8] = b"-----BEGIN ";
const END: &[u8] = b"-----END ";
const DASHES: &[u8] = b"-----";

/// Convert DER‑encoded data into a PEM‑encoded string with the provided label.
pub fn der_to_pem(der: &[u8], label: &str) -> String {
    let pem = pem::Pem::new(label, der);
    pem::encode_config(
        &pem,
        pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF),
    )
}

/// Iterates over the decodable PEM blocks in `input`, in order.
///
/// Text between blocks is ignored, and so is a block whose armour or base64
/// body is malformed: the scan resumes after it at the next block.
pub fn pem_blocks(input: &[u8]) -> PemBlocks<'_> {
    PemBlocks { rest: input }
}

/// Returns the DER contents of the first decodable PEM block in `input`.
pub fn first_block_der(input: &[u8]) -> Result<Vec<u8>> {
    pem_blocks(input)
        .next()
        .map(pem::Pem::into_contents)
        .ok_or_else(|| CaError::Decode("no PEM block found".to_string()))
}

pub struct PemBlocks<'a> {
    rest: &'a [u8],
}

impl Iterator for PemBlocks<'_> {
    type Item = pem::Pem;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let start = find(self.rest, BEGIN)?;
            let block = &self.rest[start..];
            let end = find(block, END)
                .and_then(|end| {
                    let label = end + END.len();
                    find(&block[label..], DASHES).map(|close| label + close + DASHES.len())
                })
                .unwrap_or(block.len());
            self.rest = &block[end..];

            match pem::parse(&block[..end]) {
                Ok(pem) => return Some(pem),
                Err(e) => debug!(error = %e, "skipping undecodable PEM block"),
            }
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
