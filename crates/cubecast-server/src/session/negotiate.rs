use cubecast_proto::capability::SUPPORTED_EXTENSIONS;
use cubecast_proto::packets::{CustomBlockSupportLevel, ExtEntry, ExtInfo};

use super::*;

/// Name the server reports in its ExtInfo.
const APP_NAME: &str = "cubecast";

/// Highest CustomBlocks support level the server understands.
const CUSTOM_BLOCKS_LEVEL: u8 = 1;

impl Session {
    /// Exchange extension lists with a CPE client and settle on the shared
    /// capability set.
    pub(super) fn negotiate(&mut self) -> Result<(), SessionError> {
        self.send_now(&Packet::encode(&ExtInfo::new(
            APP_NAME,
            SUPPORTED_EXTENSIONS.len() as i16,
        )))?;
        for ext in SUPPORTED_EXTENSIONS {
            self.send_now(&Packet::encode(&ExtEntry::new(ext.name, ext.version)))?;
        }
        self.flush()?;

        let client_info = loop {
            match self.read_packet_blocking(Phase::Negotiation)? {
                ClientPacket::ExtInfo(info) => break info,
                ClientPacket::Ping => continue,
                other => return Err(other.unexpected("ExtInfo").into()),
            }
        };
        let expected = usize::try_from(client_info.extension_count).unwrap_or(0);
        let mut entries = Vec::with_capacity(expected);
        while entries.len() < expected {
            match self.read_packet_blocking(Phase::Negotiation)? {
                ClientPacket::ExtEntry(entry) => entries.push(entry),
                ClientPacket::Ping => continue,
                other => return Err(other.unexpected("ExtEntry").into()),
            }
        }

        let caps = CapabilitySet::negotiate(&entries);
        if caps.contains(CapabilitySet::CUSTOM_BLOCKS) {
            self.send_now(&Packet::encode(&CustomBlockSupportLevel {
                level: CUSTOM_BLOCKS_LEVEL,
            }))?;
            self.flush()?;
            loop {
                match self.read_packet_blocking(Phase::Negotiation)? {
                    ClientPacket::CustomBlockSupportLevel(reply) => {
                        debug!("{} supports custom blocks level {}", self.handle.name(), reply.level);
                        break;
                    }
                    ClientPacket::Ping => continue,
                    other => return Err(other.unexpected("CustomBlockSupportLevel").into()),
                }
            }
        }

        self.set_capabilities(caps);
        debug!(
            "{} runs {} with {} extensions; agreed on {:?}",
            self.handle.name(),
            client_info.app_name,
            entries.len(),
            caps
        );
        Ok(())
    }
}
