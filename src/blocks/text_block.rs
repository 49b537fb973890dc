use crate::{
    Error, Result,
    blocks::common::{BlockHeader, BlockParse, padding_to_align_8, validate_buffer_size},
};

/// TXBLOCK: a null terminated UTF-8 string, e.g. the acquisition name of a
/// channel group or the name of a channel.
#[derive(Debug, Clone)]
pub struct TextBlock {
    pub header: BlockHeader,
    pub text: String,
}

impl BlockParse<'_> for TextBlock {
    const ID: &'static str = "##TX";
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        let text = decode_text_payload(&header, bytes)?;
        Ok(Self { header, text })
    }
}

/// Extract the zero-trimmed string stored after a link-less header.
pub(crate) fn decode_text_payload(header: &BlockHeader, bytes: &[u8]) -> Result<String> {
    let data_len = (header.length as usize).saturating_sub(24);
    validate_buffer_size(bytes, 24 + data_len)?;
    let data = &bytes[24..24 + data_len];
    Ok(String::from_utf8_lossy(data)
        .trim_matches('\0')
        .to_string())
}

/// On-disk size of a text-like block holding `text`: header, text, one null
/// terminator and padding up to the next 8-byte boundary.
pub(crate) fn text_block_len(text: &str) -> usize {
    let text_bytes = text.as_bytes();
    let needs_null = text_bytes.last().is_none_or(|b| *b != 0);
    let unpadded = 24 + text_bytes.len() + usize::from(needs_null);
    unpadded + padding_to_align_8(unpadded)
}

/// Serialize a text-like block (`##TX` or `##MD`).
pub(crate) fn encode_text_block(header: &BlockHeader, text: &str) -> Result<Vec<u8>> {
    let total_size = text_block_len(text);
    if header.length as usize != total_size {
        return Err(Error::BlockSerializationError(format!(
            "{} header length ({}) does not match calculated size ({})",
            header.id, header.length, total_size
        )));
    }

    let mut buffer = Vec::with_capacity(total_size);
    buffer.extend_from_slice(&header.to_bytes()?);
    buffer.extend_from_slice(text.as_bytes());
    // The null terminator and the alignment padding are both zero bytes.
    buffer.resize(total_size, 0);

    debug_assert_eq!(buffer.len() % 8, 0, "text block size is not 8-byte aligned");
    Ok(buffer)
}

impl TextBlock {
    /// Creates a new TextBlock with the provided text content.
    /// The block length is computed from the text, including terminator and
    /// 8-byte alignment.
    pub fn new(text: &str) -> Self {
        TextBlock {
            header: BlockHeader::new("##TX", text_block_len(text) as u64, 0),
            text: text.to_string(),
        }
    }

    /// Serializes the TextBlock: header, UTF-8 text, null terminator, padding.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if self.header.id != "##TX" {
            return Err(Error::BlockSerializationError(format!(
                "TextBlock must have ID '##TX', found '{}'",
                self.header.id
            )));
        }
        encode_text_block(&self.header, &self.text)
    }
}

impl Default for TextBlock {
    fn default() -> Self {
        Self::new("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lengths_are_aligned() {
        assert_eq!(text_block_len(""), 32);
        assert_eq!(text_block_len("1234567"), 32);
        assert_eq!(text_block_len("12345678"), 40);
    }

    #[test]
    fn wrong_length_is_rejected() {
        let mut tb = TextBlock::new("abc");
        tb.header.length = 24;
        assert!(tb.to_bytes().is_err());
    }
}
