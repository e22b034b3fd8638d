use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use super::{MAX_FRAME_BYTES, MAX_HEADER_LINE_BYTES};

/// One framed message: its header lines (in arrival order) and raw body bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Frame {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

pub struct FrameReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
        }
    }

    async fn read_line_limited(&mut self) -> io::Result<Option<String>> {
        let mut buf = Vec::<u8>::new();
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                if buf.is_empty() {
                    return Ok(None);
                }
                break;
            }

            let newline_pos = available.iter().position(|&b| b == b'\n');
            let take = newline_pos.map(|pos| pos + 1).unwrap_or(available.len());
            if buf.len() + take > MAX_HEADER_LINE_BYTES {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("header line exceeds maximum size ({MAX_HEADER_LINE_BYTES} bytes)"),
                ));
            }

            buf.extend_from_slice(&available[..take]);
            self.reader.consume(take);
            if newline_pos.is_some() {
                break;
            }
        }

        let line = String::from_utf8(buf)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "header line is not UTF-8"))?;
        Ok(Some(line))
    }

    /// Read the next frame. Returns `Ok(None)` on a clean EOF between frames.
    pub async fn read_frame(&mut self) -> io::Result<Option<Frame>> {
        let mut headers = Vec::new();
        let mut content_length: Option<usize> = None;
        let mut saw_header_line = false;

        loop {
            let Some(line) = self.read_line_limited().await? else {
                if !saw_header_line {
                    return Ok(None);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "EOF while reading message headers",
                ));
            };
            saw_header_line = true;

            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                break;
            }

            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let (name, value) = (name.trim(), value.trim());
            if name.eq_ignore_ascii_case("Content-Length") {
                content_length = Some(value.parse::<usize>().map_err(|err| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("invalid Content-Length {value:?}: {err}"),
                    )
                })?);
            }
            headers.push((name.to_owned(), value.to_owned()));
        }

        let Some(content_length) = content_length else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "message missing Content-Length header",
            ));
        };

        if content_length > MAX_FRAME_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Content-Length {content_length} exceeds maximum allowed size {MAX_FRAME_BYTES}"
                ),
            ));
        }

        let mut body = vec![0u8; content_length];
        self.reader.read_exact(&mut body).await?;
        Ok(Some(Frame { headers, body }))
    }
}

pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_message(&mut self, body: &[u8]) -> io::Result<()> {
        self.writer
            .write_all(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes())
            .await?;
        self.writer.write_all(body).await?;
        self.writer.flush().await
    }

    /// Write a frame with extra headers ahead of `Content-Length` (used for the connect banner).
    pub async fn write_frame(&mut self, headers: &[(&str, &str)], body: &[u8]) -> io::Result<()> {
        let mut head = String::new();
        for (name, value) in headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
        self.writer.write_all(head.as_bytes()).await?;
        self.writer.write_all(body).await?;
        self.writer.flush().await
    }
}
