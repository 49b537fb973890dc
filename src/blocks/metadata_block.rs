use crate::{
    Error, Result,
    blocks::{
        common::{BlockHeader, BlockParse},
        text_block::{decode_text_payload, encode_text_block, text_block_len},
    },
};

/// MDBLOCK: XML comment attached to a channel group, channel or source.
#[derive(Debug, Clone)]
pub struct MetadataBlock {
    pub header: BlockHeader,
    pub xml: String,
}

impl BlockParse<'_> for MetadataBlock {
    const ID: &'static str = "##MD";
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        let xml = decode_text_payload(&header, bytes)?;
        Ok(Self { header, xml })
    }
}

impl MetadataBlock {
    /// Creates a metadata block holding `xml` verbatim.
    pub fn new(xml: &str) -> Self {
        MetadataBlock {
            header: BlockHeader::new("##MD", text_block_len(xml) as u64, 0),
            xml: xml.to_string(),
        }
    }

    /// Wraps a plain comment in the minimal `<CGcomment>` envelope used for
    /// channel group comments.
    pub fn group_comment(text: &str) -> Self {
        Self::new(&format!("<CGcomment><TX>{}</TX></CGcomment>", escape_xml(text)))
    }

    /// Extract the `<TX>` content of a comment, or the raw XML when it has no
    /// such element.
    pub fn text(&self) -> String {
        match (self.xml.find("<TX>"), self.xml.find("</TX>")) {
            (Some(start), Some(end)) if start + 4 <= end => {
                unescape_xml(&self.xml[start + 4..end])
            }
            _ => self.xml.clone(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if self.header.id != "##MD" {
            return Err(Error::BlockSerializationError(format!(
                "MetadataBlock must have ID '##MD', found '{}'",
                self.header.id
            )));
        }
        encode_text_block(&self.header, &self.xml)
    }
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_comment_roundtrip() -> Result<()> {
        let md = MetadataBlock::group_comment("engine <idle> & warm");
        let parsed = MetadataBlock::from_bytes(&md.to_bytes()?)?;
        assert_eq!(parsed.text(), "engine <idle> & warm");
        Ok(())
    }

    #[test]
    fn raw_xml_without_tx_is_returned_as_is() {
        let md = MetadataBlock::new("<CGcomment/>");
        assert_eq!(md.text(), "<CGcomment/>");
    }
}
