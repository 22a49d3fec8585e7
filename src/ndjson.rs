//! Newline-delimited JSON over a chunked byte stream.
//!
//! A streamed report is one metadata line followed by one line per row. Chunk
//! boundaries from the transport do not line up with lines, so bytes are
//! buffered until a full line is available.

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::de::DeserializeOwned;

use crate::error::ApiError;
use crate::models::{PerformanceReport, ReportMetadata};

pub type ByteStream = BoxStream<'static, Result<Bytes, ApiError>>;

/// Yields complete raw lines from a byte stream. Blank lines are skipped.
pub struct LineReader {
    stream: ByteStream,
    buffer: Vec<u8>,
    exhausted: bool,
}

impl LineReader {
    pub fn new(stream: ByteStream) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
            exhausted: false,
        }
    }

    /// Next non-blank line without its line ending, or `None` at end of input.
    /// A trailing line without a newline is still returned. Bytes are passed
    /// through as received; UTF-8 is checked by the JSON decoder.
    pub async fn next_line(&mut self) -> Result<Option<Vec<u8>>, ApiError> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
                let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
                strip_line_ending(&mut line);
                if is_blank(&line) {
                    continue;
                }
                return Ok(Some(line));
            }

            if self.exhausted {
                let mut line = std::mem::take(&mut self.buffer);
                if is_blank(&line) {
                    return Ok(None);
                }
                strip_line_ending(&mut line);
                return Ok(Some(line));
            }

            match self.stream.next().await {
                Some(chunk) => self.buffer.extend_from_slice(&chunk?),
                None => self.exhausted = true,
            }
        }
    }
}

fn strip_line_ending(line: &mut Vec<u8>) {
    while matches!(line.last(), Some(b'\n' | b'\r')) {
        line.pop();
    }
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

/// A submitted report whose rows are still arriving on the response body.
pub struct ReportStream {
    pub metadata: ReportMetadata,
    pub lines: LineReader,
}

/// Read the metadata line off `stream`, leaving the rows unread.
pub async fn open_report_stream(stream: ByteStream) -> Result<ReportStream, ApiError> {
    let mut lines = LineReader::new(stream);
    let first = lines.next_line().await?.ok_or(ApiError::MissingMetadata)?;
    let metadata = decode_line(&first, "report metadata")?;
    Ok(ReportStream { metadata, lines })
}

pub fn decode_row(line: &[u8]) -> Result<PerformanceReport, ApiError> {
    decode_line(line, "performance report row")
}

fn decode_line<T: DeserializeOwned>(line: &[u8], what: &'static str) -> Result<T, ApiError> {
    serde_json::from_slice(line).map_err(|source| ApiError::decode(what, line, source))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn byte_stream(chunks: Vec<&str>) -> ByteStream {
        let chunks: Vec<Result<Bytes, ApiError>> = chunks
            .into_iter()
            .map(|c| Ok(Bytes::from(c.to_string())))
            .collect();
        futures::stream::iter(chunks).boxed()
    }

    pub(crate) const METADATA_LINE: &str = r#"{"uuid":"r-1","created":"2024-05-01T10:00:00Z","cost":12,"config":{"target":{"host":"example.com","paths":{"mode":"manual","paths":["/"]}},"performance_budgets_id":3},"finished":null}"#;

    async fn collect(mut reader: LineReader) -> Vec<String> {
        let mut lines = vec![];
        while let Some(line) = reader.next_line().await.unwrap() {
            lines.push(String::from_utf8(line).unwrap());
        }
        lines
    }

    #[tokio::test]
    async fn lines_split_across_chunks() {
        let reader = LineReader::new(byte_stream(vec!["{\"a\":", "1}\n{\"b\"", ":2}\n"]));
        assert_eq!(collect(reader).await, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[tokio::test]
    async fn trailing_line_without_newline() {
        let reader = LineReader::new(byte_stream(vec!["one\r\n\n  \ntwo"]));
        assert_eq!(collect(reader).await, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn empty_stream_has_no_metadata() {
        let err = open_report_stream(byte_stream(vec![])).await.err().unwrap();
        assert!(matches!(err, ApiError::MissingMetadata));
    }

    #[tokio::test]
    async fn metadata_line_is_consumed_first() {
        let body = format!("{}\nnext", METADATA_LINE);
        let mut stream = open_report_stream(byte_stream(vec![&body])).await.unwrap();
        assert_eq!(stream.metadata.uuid, "r-1");
        assert_eq!(stream.metadata.config.performance_budgets_id, Some(3));
        assert_eq!(
            stream.lines.next_line().await.unwrap().as_deref(),
            Some(&b"next"[..])
        );
    }

    #[tokio::test]
    async fn malformed_metadata_is_a_decode_error() {
        let err = open_report_stream(byte_stream(vec!["not json\n"]))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ApiError::Decode { what: "report metadata", .. }));
    }

    #[tokio::test]
    async fn invalid_utf8_row_is_a_decode_error() {
        let chunks: Vec<Result<Bytes, ApiError>> = vec![Ok(Bytes::from_static(
            b"{\"id\":1,\"path\":\"/caf\xe9\"}\n",
        ))];
        let mut reader = LineReader::new(futures::stream::iter(chunks).boxed());
        let line = reader.next_line().await.unwrap().unwrap();
        assert_eq!(line.last(), Some(&b'}'));

        let err = decode_row(&line).unwrap_err();
        assert!(matches!(
            err,
            ApiError::Decode {
                what: "performance report row",
                ..
            }
        ));
    }

    #[test]
    fn row_with_null_metric_and_unknown_device_decodes() {
        let line = br#"{"id":8,"path":"/","device":{"name":"tablet"},"country":{"code":"SE"},"max_potential_fid_ms":null,"server_response_time_ms":90,"interactive_ms":1500,"cumulative_layout_shift":{"value":0.02},"largest_contentful_paint":{"value_ms":900}}"#;
        let row = decode_row(line).unwrap();
        assert_eq!(row.id, 8);
        assert_eq!(row.max_potential_fid_ms, 0);
        assert_eq!(row.device.name, crate::models::DeviceName::Unknown);
    }
}
