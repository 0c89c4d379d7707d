//! Capture file reader for libpcap and pcapng files

use super::{
    CaptureHeader, CapturedFrame, FrameFilter, ID_LEN, ReadError, Stream, StreamAddr,
    StreamOpener, Timestamp, id_from_str,
};
use crate::{Error, Result};
use pcap_parser::pcapng::Block;
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, Linktype, PcapBlockOwned, PcapError, PcapNGReader};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;
use tracing::debug;

const MAGIC_PCAPNG: u32 = 0x0a0d_0d0a;
/// Room for one maximum-snaplen record plus its header
const READER_CAPACITY: usize = 1 << 19;

/// Timestamp unit of one pcapng interface
#[derive(Debug, Clone, Copy)]
struct Interface {
    ethernet: bool,
    units_per_sec: u64,
}

/// Capture stream over the records of a libpcap or pcapng file
pub struct PcapStream {
    reader: Box<dyn PcapReaderIterator + Send>,
    nanos: bool,
    interfaces: Vec<Interface>,
    interface_id: [u8; ID_LEN],
    source_id: [u8; ID_LEN],
    buf: Vec<u8>,
    done: bool,
}

impl PcapStream {
    /// Open a capture file. The file stem becomes the capture source id.
    pub fn open(path: &Path, interface: Option<&str>) -> Result<Self> {
        let file = File::open(path)?;
        let mut stream = Self::from_reader(BufReader::new(file), interface)?;
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            stream.source_id = id_from_str(stem);
        }
        Ok(stream)
    }

    /// Pick the legacy or pcapng parser from the leading magic and check
    /// that a legacy file carries Ethernet frames.
    pub fn from_reader<R: Read + Send + 'static>(mut reader: R, interface: Option<&str>) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        let input = Cursor::new(magic).chain(reader);

        let pcapng = u32::from_le_bytes(magic) == MAGIC_PCAPNG;
        let parser: Box<dyn PcapReaderIterator + Send> = if pcapng {
            Box::new(
                PcapNGReader::new(READER_CAPACITY, input)
                    .map_err(|e| parse_error("not a pcapng file", e))?,
            )
        } else {
            Box::new(
                LegacyPcapReader::new(READER_CAPACITY, input).map_err(|_| {
                    Error::Parse(format!(
                        "not a pcap file (magic 0x{:08x})",
                        u32::from_le_bytes(magic)
                    ))
                })?,
            )
        };

        let mut stream = Self {
            reader: parser,
            nanos: false,
            interfaces: Vec::new(),
            interface_id: interface.map(id_from_str).unwrap_or_default(),
            source_id: [0u8; ID_LEN],
            buf: Vec::new(),
            done: false,
        };
        if !pcapng {
            stream.read_file_header()?;
        }
        Ok(stream)
    }

    fn read_file_header(&mut self) -> Result<()> {
        loop {
            match self.reader.next() {
                Ok((offset, PcapBlockOwned::LegacyHeader(header))) => {
                    self.nanos = header.is_nanosecond_precision();
                    let linktype = header.network;
                    self.reader.consume(offset);
                    return ensure_ethernet(linktype);
                }
                Ok((offset, _)) => self.reader.consume(offset),
                Err(PcapError::Eof) => return Err(Error::Parse("empty pcap file".into())),
                Err(PcapError::Incomplete(_)) => {
                    if self.reader.reader_exhausted() {
                        return Err(Error::Parse("truncated pcap header".into()));
                    }
                    self.reader
                        .refill()
                        .map_err(|e| parse_error("pcap refill", e))?;
                }
                Err(e) => return Err(parse_error("pcap header", e)),
            }
        }
    }

    /// Next packet record, `None` at a clean end of file. The bytes are left
    /// in `self.buf`.
    fn next_record(&mut self) -> Result<Option<CaptureHeader>> {
        let (interface_id, source_id) = (self.interface_id, self.source_id);
        let header = |timestamp: Timestamp, caplen: u32, origlen: u32| CaptureHeader {
            interface_id,
            capture_source_id: source_id,
            timestamp,
            link_len: origlen.max(caplen),
            captured_len: caplen,
        };

        loop {
            match self.reader.next() {
                Ok((offset, block)) => {
                    let record = match block {
                        PcapBlockOwned::Legacy(packet) => {
                            let frac = packet.ts_usec as u64;
                            let psec = if self.nanos { frac * 1_000 } else { frac * 1_000_000 };
                            let data = captured(packet.data, packet.caplen);
                            self.buf.clear();
                            self.buf.extend_from_slice(data);
                            Some(header(
                                Timestamp::new(packet.ts_sec, psec),
                                data.len() as u32,
                                packet.origlen,
                            ))
                        }
                        PcapBlockOwned::LegacyHeader(_) => None,
                        PcapBlockOwned::NG(Block::SectionHeader(_)) => {
                            self.interfaces.clear();
                            None
                        }
                        PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => {
                            self.interfaces.push(Interface {
                                ethernet: idb.linktype == Linktype::ETHERNET,
                                units_per_sec: ts_units(idb.if_tsresol),
                            });
                            None
                        }
                        PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                            let Some(iface) = self.interfaces.get(epb.if_id as usize).copied()
                            else {
                                let if_id = epb.if_id;
                                self.reader.consume(offset);
                                return Err(Error::Parse(format!(
                                    "packet for undeclared pcapng interface {if_id}"
                                )));
                            };
                            if iface.ethernet {
                                let ticks = ((epb.ts_high as u64) << 32) | epb.ts_low as u64;
                                let data = captured(epb.data, epb.caplen);
                                self.buf.clear();
                                self.buf.extend_from_slice(data);
                                Some(header(
                                    ticks_to_timestamp(ticks, iface.units_per_sec),
                                    data.len() as u32,
                                    epb.origlen,
                                ))
                            } else {
                                debug!("Skipping packet on non-Ethernet interface {}", epb.if_id);
                                None
                            }
                        }
                        PcapBlockOwned::NG(Block::SimplePacket(spb)) => {
                            if self.interfaces.first().is_some_and(|i| i.ethernet) {
                                let data = captured(spb.data, spb.origlen);
                                self.buf.clear();
                                self.buf.extend_from_slice(data);
                                Some(header(Timestamp::default(), data.len() as u32, spb.origlen))
                            } else {
                                None
                            }
                        }
                        _ => None,
                    };
                    self.reader.consume(offset);
                    if record.is_some() {
                        return Ok(record);
                    }
                }
                Err(PcapError::Eof) => return Ok(None),
                Err(PcapError::Incomplete(_)) => {
                    if self.reader.reader_exhausted() {
                        self.done = true;
                        return Err(Error::Parse("truncated capture record".into()));
                    }
                    self.reader
                        .refill()
                        .map_err(|e| parse_error("capture refill", e))?;
                }
                Err(e) => {
                    self.done = true;
                    return Err(parse_error("capture record", e));
                }
            }
        }
    }
}

/// Record bytes without pcapng block padding
fn captured(data: &[u8], caplen: u32) -> &[u8] {
    &data[..data.len().min(caplen as usize)]
}

fn parse_error(context: &str, e: impl fmt::Display) -> Error {
    Error::Parse(format!("{context}: {e}"))
}

fn ensure_ethernet(linktype: Linktype) -> Result<()> {
    if linktype == Linktype::ETHERNET {
        Ok(())
    } else {
        Err(Error::Parse(format!(
            "unsupported pcap link type {}, only Ethernet is handled",
            linktype.0
        )))
    }
}

/// Ticks per second for a pcapng `if_tsresol` value.
fn ts_units(tsresol: u8) -> u64 {
    let exp = u32::from(tsresol & 0x7f);
    let units = if tsresol & 0x80 == 0 {
        10u64.checked_pow(exp)
    } else {
        2u64.checked_pow(exp)
    };
    units.unwrap_or(1_000_000)
}

fn ticks_to_timestamp(ticks: u64, units_per_sec: u64) -> Timestamp {
    let sec = ticks / units_per_sec;
    let frac = (ticks % units_per_sec) as u128;
    let psec = frac * u128::from(super::PSEC_PER_SEC) / u128::from(units_per_sec);
    Timestamp::new(sec as u32, psec as u64)
}

impl Stream for PcapStream {
    fn read(&mut self, filter: Option<&dyn FrameFilter>) -> std::result::Result<CapturedFrame<'_>, ReadError> {
        if self.done {
            return Err(ReadError::EndOfStream);
        }
        loop {
            match self.next_record() {
                Ok(Some(header)) => {
                    if filter.is_some_and(|f| !f.matches(&header, &self.buf)) {
                        continue;
                    }
                    return Ok(CapturedFrame {
                        header,
                        data: &self.buf,
                    });
                }
                Ok(None) => {
                    self.done = true;
                    return Err(ReadError::EndOfStream);
                }
                Err(e) => return Err(ReadError::Failed(e)),
            }
        }
    }

    fn close(&mut self) {
        self.done = true;
    }
}

/// Opens local capture files; network address kinds are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileOpener;

impl StreamOpener for FileOpener {
    fn open(
        &self,
        addr: &StreamAddr,
        interface: Option<&str>,
        _port: Option<u16>,
    ) -> Result<Box<dyn Stream>> {
        match addr {
            StreamAddr::File(path) => Ok(Box::new(PcapStream::open(path, interface)?)),
            other => Err(Error::UnsupportedAddress(other.to_string())),
        }
    }
}
