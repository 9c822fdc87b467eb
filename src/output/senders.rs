use async_trait::async_trait;
use log::{error, info};
use std::path::Path;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::net::UdpSocket;

use crate::utils::error::PollError;

#[async_trait]
pub trait DataSender: Send + Sync {
    async fn send(&self, data: &str) -> Result<(), PollError>;
    fn sender_type(&self) -> &str;
    fn destination(&self) -> &str;
}

pub struct ConsoleSender;

#[async_trait]
impl DataSender for ConsoleSender {
    async fn send(&self, data: &str) -> Result<(), PollError> {
        println!("{}", data);
        Ok(())
    }

    fn sender_type(&self) -> &str {
        "console"
    }

    fn destination(&self) -> &str {
        "stdout"
    }
}

pub struct FileSender {
    file_path: String,
    append: bool,
}

impl FileSender {
    pub fn new<P: AsRef<Path>>(file_path: P, append: bool) -> Self {
        Self {
            file_path: file_path.as_ref().to_string_lossy().to_string(),
            append,
        }
    }
}

#[async_trait]
impl DataSender for FileSender {
    async fn send(&self, data: &str) -> Result<(), PollError> {
        info!("📝 Writing {} bytes to file: {}", data.len(), self.file_path);

        if let Some(parent) = Path::new(&self.file_path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        if self.append {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.file_path)
                .await
                .map_err(|e| {
                    error!("❌ Failed to open file {}: {}", self.file_path, e);
                    PollError::Output(format!("File open error: {}", e))
                })?;

            file.write_all(data.as_bytes()).await.map_err(|e| {
                error!("❌ Failed to write to file {}: {}", self.file_path, e);
                PollError::Output(format!("File write error: {}", e))
            })?;
            file.flush().await?;
        } else {
            fs::write(&self.file_path, data).await.map_err(|e| {
                error!("❌ Failed to write to file {}: {}", self.file_path, e);
                PollError::Output(format!("File write error: {}", e))
            })?;
        }

        info!("✅ Data written successfully to file: {}", self.file_path);
        Ok(())
    }

    fn sender_type(&self) -> &str {
        "file"
    }

    fn destination(&self) -> &str {
        &self.file_path
    }
}

/// Sends each formatted chunk as a single datagram, or one datagram per
/// line for line-oriented output.
pub struct UdpSender {
    target: String,
    per_line: bool,
}

impl UdpSender {
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            per_line: false,
        }
    }

    pub fn datagram_per_line(mut self, per_line: bool) -> Self {
        self.per_line = per_line;
        self
    }
}

#[async_trait]
impl DataSender for UdpSender {
    async fn send(&self, data: &str) -> Result<(), PollError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let datagrams: Vec<&str> = if self.per_line {
            data.lines().filter(|line| !line.is_empty()).collect()
        } else {
            vec![data]
        };

        let mut sent = 0;
        for datagram in &datagrams {
            sent += socket.send_to(datagram.as_bytes(), &self.target).await.map_err(|e| {
                error!("❌ UDP send to {} failed: {}", self.target, e);
                PollError::Output(format!("UDP send error: {}", e))
            })?;
        }

        info!("📡 Sent {} bytes in {} datagram(s) to {}", sent, datagrams.len(), self.target);
        Ok(())
    }

    fn sender_type(&self) -> &str {
        "udp"
    }

    fn destination(&self) -> &str {
        &self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("drive-poll-{}-{}", std::process::id(), name))
    }

    #[tokio::test]
    async fn test_file_sender_appends() {
        let path = scratch_path("append.csv");
        let _ = std::fs::remove_file(&path);

        let sender = FileSender::new(&path, true);
        sender.send("a\n").await.unwrap();
        sender.send("b\n").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\nb\n");
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_file_sender_overwrites() {
        let path = scratch_path("overwrite.csv");

        let sender = FileSender::new(&path, false);
        sender.send("first\n").await.unwrap();
        sender.send("second\n").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second\n");
        assert_eq!(sender.sender_type(), "file");
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_udp_sender_delivers_datagram() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = receiver.local_addr().unwrap().to_string();

        UdpSender::new(&target).send("VAC;PUMP1;1;2").await.unwrap();

        let mut buf = [0u8; 64];
        let (n, _) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"VAC;PUMP1;1;2");
    }

    #[tokio::test]
    async fn test_udp_sender_one_datagram_per_line() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = receiver.local_addr().unwrap().to_string();

        UdpSender::new(&target)
            .datagram_per_line(true)
            .send("VAC;PUMP1;1;2\nVAC;PUMP1;3;4\n")
            .await
            .unwrap();

        let mut buf = [0u8; 64];
        let (n, _) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"VAC;PUMP1;1;2");
        let (n, _) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"VAC;PUMP1;3;4");
    }
}
