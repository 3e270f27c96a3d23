//! ANSI control sanitizer for relayed child output
//!
//! SGR color sequences (`ESC [ ... m`) pass through untouched. Every other
//! escape sequence (cursor movement, screen clearing, OSC titles and
//! hyperlinks, DCS, terminal resets) and stray C0 control bytes are removed,
//! so untrusted framework output cannot take over the terminal.
//! `\n`, `\r` and `\t` are kept.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const ESC: u8 = 0x1b;
const BEL: u8 = 0x07;

/// Longest CSI sequence buffered before it is discarded as garbage
const MAX_CSI_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ground,
    Escape,
    Csi,
    /// OSC/DCS/SOS/PM/APC payload, dropped until its terminator
    String,
    /// ESC seen inside a string payload, `\` ends it
    StringEscape,
}

/// Streaming filter; state carries across chunk boundaries
#[derive(Debug)]
pub struct ControlSanitizer {
    state: State,
    csi: Vec<u8>,
}

impl Default for ControlSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlSanitizer {
    pub fn new() -> Self {
        Self {
            state: State::Ground,
            csi: Vec::with_capacity(MAX_CSI_LEN),
        }
    }

    /// Append the sanitized form of `input` to `out`
    pub fn filter(&mut self, input: &[u8], out: &mut Vec<u8>) {
        for &byte in input {
            match self.state {
                State::Ground => match byte {
                    ESC => self.state = State::Escape,
                    b'\n' | b'\r' | b'\t' => out.push(byte),
                    0x00..=0x1f | 0x7f => {}
                    _ => out.push(byte),
                },
                State::Escape => match byte {
                    b'[' => {
                        self.csi.clear();
                        self.csi.extend_from_slice(&[ESC, b'[']);
                        self.state = State::Csi;
                    }
                    b']' | b'P' | b'X' | b'^' | b'_' => self.state = State::String,
                    // intermediates such as the `(` in a charset designation
                    0x20..=0x2f | ESC => {}
                    _ => self.state = State::Ground,
                },
                State::Csi => match byte {
                    0x40..=0x7e => {
                        if byte == b'm' {
                            self.csi.push(byte);
                            out.extend_from_slice(&self.csi);
                        }
                        self.csi.clear();
                        self.state = State::Ground;
                    }
                    0x20..=0x3f if self.csi.len() < MAX_CSI_LEN => self.csi.push(byte),
                    ESC => {
                        self.csi.clear();
                        self.state = State::Escape;
                    }
                    _ => {
                        self.csi.clear();
                        self.state = State::Ground;
                    }
                },
                State::String => match byte {
                    BEL => self.state = State::Ground,
                    ESC => self.state = State::StringEscape,
                    _ => {}
                },
                State::StringEscape => match byte {
                    b'\\' => self.state = State::Ground,
                    ESC => {}
                    _ => self.state = State::String,
                },
            }
        }
    }
}

/// Copy `src` to `dst` through a [`ControlSanitizer`] until EOF
pub async fn relay_sanitized<R, W>(mut src: R, mut dst: W) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut sanitizer = ControlSanitizer::new();
    let mut buf = vec![0u8; 8192];
    let mut out = Vec::with_capacity(8192);
    let mut written = 0u64;

    loop {
        let n = src.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        out.clear();
        sanitizer.filter(&buf[..n], &mut out);
        if !out.is_empty() {
            dst.write_all(&out).await?;
            dst.flush().await?;
            written += out.len() as u64;
        }
    }
    Ok(written)
}
