// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Byte-source abstraction. Serial, TCP, UDP, and file sources all reduce
//! to a `read(buf) -> (bytes_read, would_block_or_eof)` capability; the
//! framer is agnostic to which one is in use.

use std::fs::File;
use std::io::{self, Read};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::time::Duration;

/// Common capability every transport reduces to. A blocking read with a
/// bounded timeout; `Ok((0, true))` means end-of-stream/would-block, not
/// an error.
pub trait ByteSource: Send {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<(usize, bool)>;
}

/// Serial port byte source: port name + baud rate, blocking read with timeout.
pub struct SerialSource {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialSource {
    pub fn open(port_name: &str, baud_rate: u32, timeout: Duration) -> io::Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(SerialSource { port })
    }
}

impl ByteSource for SerialSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<(usize, bool)> {
        match self.port.read(buf) {
            Ok(0) => Ok((0, true)),
            Ok(n) => Ok((n, false)),
            Err(e) if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock => Ok((0, true)),
            Err(e) => Err(e),
        }
    }
}

/// TCP byte source: connects once at construction, then does bounded-timeout reads.
pub struct TcpSource {
    stream: TcpStream,
    bytes_read: u64,
    byte_cap: Option<u64>,
}

impl TcpSource {
    pub fn connect<A: ToSocketAddrs>(addr: A, connect_timeout: Duration, read_timeout: Duration, byte_cap: Option<u64>) -> io::Result<Self> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no address resolved"))?;
        let stream = TcpStream::connect_timeout(&addr, connect_timeout)?;
        stream.set_read_timeout(Some(read_timeout))?;
        Ok(TcpSource { stream, bytes_read: 0, byte_cap })
    }
}

impl ByteSource for TcpSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<(usize, bool)> {
        if let Some(cap) = self.byte_cap {
            if self.bytes_read >= cap {
                return Ok((0, true));
            }
        }
        match self.stream.read(buf) {
            Ok(0) => Ok((0, true)),
            Ok(n) => {
                self.bytes_read += n as u64;
                Ok((n, false))
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock => Ok((0, true)),
            Err(e) => Err(e),
        }
    }
}

/// UDP byte source: binds locally, optionally filters by source address, per-datagram reads.
pub struct UdpSource {
    socket: UdpSocket,
    source_filter: Option<SocketAddr>,
    bytes_read: u64,
    byte_cap: Option<u64>,
}

impl UdpSource {
    pub fn bind<A: ToSocketAddrs>(
        bind_addr: A,
        read_timeout: Duration,
        source_filter: Option<SocketAddr>,
        byte_cap: Option<u64>,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(bind_addr)?;
        socket.set_read_timeout(Some(read_timeout))?;
        Ok(UdpSource { socket, source_filter, bytes_read: 0, byte_cap })
    }
}

impl ByteSource for UdpSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<(usize, bool)> {
        if let Some(cap) = self.byte_cap {
            if self.bytes_read >= cap {
                return Ok((0, true));
            }
        }
        match self.socket.recv_from(buf) {
            Ok((n, from)) => {
                if let Some(expected) = self.source_filter {
                    if from != expected {
                        return Ok((0, true));
                    }
                }
                self.bytes_read += n as u64;
                Ok((n, false))
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock => Ok((0, true)),
            Err(e) => Err(e),
        }
    }
}

/// Ordinary file byte source, for offline decode of captured samples.
pub struct FileSource {
    file: File,
}

impl FileSource {
    pub fn open(path: &std::path::Path) -> io::Result<Self> {
        Ok(FileSource { file: File::open(path)? })
    }
}

impl ByteSource for FileSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<(usize, bool)> {
        match self.file.read(buf) {
            Ok(0) => Ok((0, true)),
            Ok(n) => Ok((n, false)),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_source_reads_until_eof() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[1, 2, 3, 4, 5]).unwrap();
        let mut source = FileSource::open(tmp.path()).unwrap();
        let mut buf = [0u8; 3];
        let (n, eof) = source.read(&mut buf).unwrap();
        assert_eq!(n, 3);
        assert!(!eof);
        let (n, eof) = source.read(&mut buf).unwrap();
        assert_eq!(n, 2);
        assert!(!eof);
        let (n, eof) = source.read(&mut buf).unwrap();
        assert_eq!(n, 0);
        assert!(eof);
    }

    #[test]
    fn udp_source_filters_unexpected_senders() {
        let recv_sock = UdpSocket::bind("127.0.0.1:0").unwrap();
        let recv_addr = recv_sock.local_addr().unwrap();
        drop(recv_sock);

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        let sender_addr = sender.local_addr().unwrap();
        let other = SocketAddr::from(([127, 0, 0, 1], sender_addr.port().wrapping_add(1).max(1)));

        let mut source = UdpSource::bind(recv_addr, Duration::from_millis(200), Some(other), None).unwrap();
        sender.send_to(&[9, 9, 9], recv_addr).unwrap();
        let mut buf = [0u8; 8];
        let (n, would_block) = source.read(&mut buf).unwrap();
        assert_eq!(n, 0);
        assert!(would_block);
    }
}
