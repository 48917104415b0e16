//! SCP download, sink side.
//!
//! The remote `scp -f` process is the source. The exchange for one regular
//! file is:
//!
//! ```text
//! sink   -> \0
//! source -> C<mode> <size> <name>\n
//! sink   -> \0
//! source -> <size bytes> \0
//! sink   -> \0
//! ```
//!
//! A source that cannot send the file answers the first `\0` with a line
//! starting `\x01` (warning) or `\x02` (fatal) instead of a `C` record.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

use crate::error::{NetsshError, Result};
use crate::exec::await_exit;
use crate::exec::reader::spawn_stderr_logger;
use crate::profile::PlatformProfile;
use crate::transport::{BoxedReader, BoxedWriter, ChannelIo, Link};

/// Longest header line accepted from the source.
const MAX_HEADER_LEN: usize = 4096;

/// Largest permission value a `C` record may carry.
const MAX_MODE: u32 = 0o7777;

/// What was received by a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSummary {
    /// File name announced by the source.
    pub name: String,
    /// Bytes received.
    pub size: u64,
    /// Permission bits announced by the source.
    pub mode: u32,
    /// Where the file was written.
    pub local_path: PathBuf,
}

/// A parsed `C` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScpHeader {
    pub mode: u32,
    pub size: u64,
    pub name: String,
}

/// Downloads single files over SCP.
#[derive(Debug, Clone)]
pub struct FileTransferClient {
    shutdown_grace: Duration,
}

impl FileTransferClient {
    /// Client using the shutdown grace of `profile`.
    #[must_use]
    pub const fn new(profile: &PlatformProfile) -> Self {
        Self {
            shutdown_grace: profile.shutdown_grace,
        }
    }

    /// Copy `remote` on `link` to `local`.
    ///
    /// The local file is only created once a valid header has arrived, and
    /// is removed again if fewer bytes than announced arrive.
    pub async fn download(&self, link: &dyn Link, remote: &str, local: &Path) -> Result<TransferSummary> {
        let label = link.label().to_string();
        let command = format!("scp -f {}", shell_quote(remote));
        tracing::info!(link = %label, remote = %remote, local = %local.display(), "Starting download");

        let ChannelIo {
            mut stdin,
            stdout,
            stderr,
            exit,
        } = link.open_exec(&command).await?;
        spawn_stderr_logger(stderr, label.clone());

        let mut stdout = BufReader::new(stdout);
        let result = self.receive(&mut stdin, &mut stdout, local, &label).await;

        if let Err(e) = stdin.shutdown().await {
            tracing::debug!(link = %label, error = %e, "Could not close scp input");
        }
        drop(stdin);
        await_exit(exit, self.shutdown_grace, &label).await;

        let header = match result {
            Ok(header) => header,
            Err(err) => {
                tracing::error!(link = %label, remote = %remote, error = %err, "Download failed");
                return Err(err);
            }
        };

        apply_mode(local, header.mode).await;
        tracing::info!(link = %label, name = %header.name, size = header.size, "Download finished");
        Ok(TransferSummary {
            name: header.name,
            size: header.size,
            mode: header.mode,
            local_path: local.to_path_buf(),
        })
    }

    async fn receive(
        &self,
        stdin: &mut BoxedWriter,
        stdout: &mut BufReader<BoxedReader>,
        local: &Path,
        label: &str,
    ) -> Result<ScpHeader> {
        ack(stdin).await?;
        let line = read_header(stdout).await?;
        let header = parse_header(&line)?;
        let mode = format!("{:04o}", header.mode);
        tracing::debug!(link = %label, mode = %mode, size = header.size, name = %header.name, "Received file header");
        ack(stdin).await?;

        if let Err(err) = copy_to(stdout, local, header.size).await {
            if let Err(e) = tokio::fs::remove_file(local).await {
                tracing::debug!(path = %local.display(), error = %e, "Could not remove partial file");
            }
            return Err(err);
        }
        ack(stdin).await?;

        match tokio::time::timeout(self.shutdown_grace, stdout.read_u8()).await {
            Ok(Ok(0)) => {}
            Ok(Ok(status)) => tracing::warn!(link = %label, status, "Source reported a problem after the file"),
            Ok(Err(_)) => tracing::debug!(link = %label, "Source closed without a final status"),
            Err(_) => tracing::debug!(link = %label, "No final status from source"),
        }
        Ok(header)
    }
}

async fn ack(stdin: &mut BoxedWriter) -> Result<()> {
    NetsshError::with_io_context(stdin.write_all(&[0]).await, "sending scp ack")?;
    NetsshError::with_io_context(stdin.flush().await, "sending scp ack")
}

/// Read one header line, newline excluded.
async fn read_header(stdout: &mut BufReader<BoxedReader>) -> Result<String> {
    let mut line = Vec::new();
    loop {
        let byte = match stdout.read_u8().await {
            Ok(byte) => byte,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(NetsshError::protocol(format!(
                    "source closed before sending a complete header (got {:?})",
                    String::from_utf8_lossy(&line)
                )));
            }
            Err(e) => return Err(NetsshError::io_context("reading scp header", e)),
        };
        if byte == b'\n' {
            break;
        }
        line.push(byte);
        if line.len() > MAX_HEADER_LEN {
            return Err(NetsshError::protocol("scp header too long"));
        }
    }
    String::from_utf8(line).map_err(|_| NetsshError::protocol("scp header is not valid UTF-8"))
}

/// Parse a `C<mode> <size> <name>` record, or turn a remote error line into
/// a protocol error.
pub(crate) fn parse_header(line: &str) -> Result<ScpHeader> {
    let Some(first) = line.chars().next() else {
        return Err(NetsshError::protocol("empty scp header"));
    };
    match first {
        '\x01' | '\x02' => {
            return Err(NetsshError::protocol(format!("remote scp: {}", line[1..].trim())));
        }
        'D' => return Err(NetsshError::protocol("remote path is a directory")),
        'C' => {}
        other => {
            return Err(NetsshError::protocol(format!("unexpected scp record {other:?}")));
        }
    }

    let mut fields = line[1..].splitn(3, ' ');
    let (Some(mode), Some(size), Some(name)) = (fields.next(), fields.next(), fields.next()) else {
        return Err(NetsshError::protocol(format!("malformed scp header {line:?}")));
    };

    let mode = u32::from_str_radix(mode, 8)
        .ok()
        .filter(|m| *m <= MAX_MODE)
        .ok_or_else(|| NetsshError::protocol(format!("bad mode in scp header {line:?}")))?;
    let size = size
        .parse::<u64>()
        .map_err(|_| NetsshError::protocol(format!("bad size in scp header {line:?}")))?;
    if name.is_empty() || name.contains('/') || name == ".." {
        return Err(NetsshError::protocol(format!("bad file name in scp header {line:?}")));
    }

    Ok(ScpHeader {
        mode,
        size,
        name: name.to_string(),
    })
}

async fn copy_to(stdout: &mut BufReader<BoxedReader>, local: &Path, size: u64) -> Result<()> {
    let context = format!("writing {}", local.display());
    let mut file = NetsshError::with_io_context(tokio::fs::File::create(local).await, context.as_str())?;
    let copied = NetsshError::with_io_context(
        tokio::io::copy(&mut (&mut *stdout).take(size), &mut file).await,
        context.as_str(),
    )?;
    NetsshError::with_io_context(file.flush().await, context)?;

    if copied < size {
        return Err(NetsshError::protocol(format!(
            "source closed after {copied} of {size} bytes"
        )));
    }
    Ok(())
}

#[cfg(unix)]
async fn apply_mode(local: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;

    let permissions = std::fs::Permissions::from_mode(mode);
    if let Err(e) = tokio::fs::set_permissions(local, permissions).await {
        tracing::warn!(path = %local.display(), error = %e, "Could not apply file mode");
    }
}

#[cfg(not(unix))]
async fn apply_mode(_local: &Path, _mode: u32) {}

/// Quote `path` for a POSIX shell when it contains anything unusual.
fn shell_quote(path: &str) -> String {
    let plain = !path.is_empty()
        && path
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | '~' | ':' | '+' | '@'));
    if plain {
        path.to_string()
    } else {
        format!("'{}'", path.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::error::ErrorKind;
    use crate::test_utils::{ExecScript, FakeLink};

    fn client() -> FileTransferClient {
        FileTransferClient::new(&PlatformProfile::default().shutdown_grace(Duration::from_millis(200)))
    }

    #[tokio::test]
    async fn downloads_one_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let local = dir.path().join("greeting.txt");
        let link = FakeLink::new("admin@r1:22")
            .with_exec(ExecScript::scp_source("greeting.txt", 0o644, "hello, world\n"));

        let summary = client()
            .download(&link, "/tmp/greeting.txt", &local)
            .await
            .expect("download");

        assert_eq!(summary.size, 13);
        assert_eq!(summary.mode, 0o644);
        assert_eq!(summary.name, "greeting.txt");
        assert_eq!(std::fs::read_to_string(&local).expect("read"), "hello, world\n");
        assert_eq!(link.exec_commands(), ["scp -f /tmp/greeting.txt"]);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&local).expect("metadata").permissions().mode();
            assert_eq!(mode & 0o777, 0o644);
        }
    }

    #[tokio::test]
    async fn content_is_copied_verbatim() {
        let dir = tempfile::tempdir().expect("tempdir");
        let local = dir.path().join("blob.bin");
        let content: Vec<u8> = (0..=255u8).chain([0, b'\n', 0]).collect();
        let link = FakeLink::new("admin@r1:22")
            .with_exec(ExecScript::scp_source("blob.bin", 0o600, content.clone()).stderr_line("banner noise"));

        let summary = client().download(&link, "blob.bin", &local).await.expect("download");
        assert_eq!(summary.size, content.len() as u64);
        assert_eq!(std::fs::read(&local).expect("read"), content);
    }

    #[tokio::test]
    async fn remote_error_creates_no_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let local = dir.path().join("missing.txt");
        let link = FakeLink::new("admin@r1:22")
            .with_exec(ExecScript::raw(b"\x01scp: /nope: No such file or directory\n".to_vec()).exit_status(1));

        let err = client().download(&link, "/nope", &local).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(err.to_string().contains("No such file"));
        assert!(!local.exists());
    }

    #[tokio::test]
    async fn directory_record_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let local = dir.path().join("etc");
        let link = FakeLink::new("admin@r1:22").with_exec(ExecScript::raw(b"D0755 0 etc\n".to_vec()));

        let err = client().download(&link, "/etc", &local).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(!local.exists());
    }

    #[tokio::test]
    async fn short_content_removes_partial_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let local = dir.path().join("cut.txt");
        let link = FakeLink::new("admin@r1:22").with_exec(ExecScript::raw(b"C0644 100 cut.txt\nshort".to_vec()));

        let err = client().download(&link, "cut.txt", &local).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(err.to_string().contains("5 of 100"));
        assert!(!local.exists());
    }

    #[test]
    fn header_rejections() {
        for line in ["", "C0644 12", "C9999 1 x", "C0644 -1 x", "C0644 1 ", "C0644 1 a/b", "T123 0 456 0", "\x02fatal"] {
            assert!(parse_header(line).is_err(), "accepted {line:?}");
        }
        let header = parse_header("C0755 0 name with spaces").expect("parse");
        assert_eq!(header.name, "name with spaces");
        assert_eq!(header.size, 0);
    }

    #[test]
    fn quoting() {
        assert_eq!(shell_quote("/var/log/messages"), "/var/log/messages");
        assert_eq!(shell_quote("my file"), "'my file'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    proptest! {
        #[test]
        fn well_formed_headers_parse(mode in 0u32..=0o7777, size in any::<u64>(), name in "[A-Za-z0-9._-][A-Za-z0-9._ -]{0,30}") {
            prop_assume!(name != "..");
            let header = parse_header(&format!("C{mode:04o} {size} {name}")).expect("parse");
            prop_assert_eq!(header, ScpHeader { mode, size, name });
        }

        #[test]
        fn arbitrary_lines_never_panic(line in "\\PC{0,64}") {
            let _ = parse_header(&line);
        }
    }
}
