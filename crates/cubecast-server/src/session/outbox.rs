//! The two per-session output queues. Any thread may push; only the
//! session worker pops.

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{unbounded, Receiver, Sender};
use cubecast_proto::packets::Packet;
use cubecast_proto::types::BlockPos;

/// A block change to show this client, independent of the shared map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockUpdate {
    pub pos: BlockPos,
    pub block: u8,
}

pub struct Outbox {
    priority_tx: Sender<Packet>,
    priority_rx: Receiver<Packet>,
    blocks_tx: Sender<BlockUpdate>,
    blocks_rx: Receiver<BlockUpdate>,
    open: AtomicBool,
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Outbox {
    pub fn new() -> Self {
        let (priority_tx, priority_rx) = unbounded();
        let (blocks_tx, blocks_rx) = unbounded();
        Self {
            priority_tx,
            priority_rx,
            blocks_tx,
            blocks_rx,
            open: AtomicBool::new(true),
        }
    }

    /// False once the session started shutting down.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn push(&self, packet: Packet) -> bool {
        self.is_open() && self.priority_tx.send(packet).is_ok()
    }

    pub fn push_block(&self, update: BlockUpdate) -> bool {
        self.is_open() && self.blocks_tx.send(update).is_ok()
    }

    pub(crate) fn pop_packet(&self) -> Option<Packet> {
        self.priority_rx.try_recv().ok()
    }

    pub(crate) fn pop_block(&self) -> Option<BlockUpdate> {
        self.blocks_rx.try_recv().ok()
    }

    pub fn pending_packets(&self) -> usize {
        self.priority_rx.len()
    }

    pub fn block_backlog(&self) -> usize {
        self.blocks_rx.len()
    }

    /// Drop queued block updates; returns how many were discarded.
    pub(crate) fn clear_blocks(&self) -> usize {
        self.blocks_rx.try_iter().count()
    }

    /// Stop accepting work, drop everything queued and leave `kick` as the
    /// only packet. Returns false if the outbox was already closed.
    pub fn close_with(&self, kick: Packet) -> bool {
        if !self.open.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.priority_rx.try_iter().for_each(drop);
        self.blocks_rx.try_iter().for_each(drop);
        self.priority_tx.send(kick).is_ok()
    }

    /// Stop accepting work without a terminal packet.
    pub(crate) fn close(&self) {
        self.open.store(false, Ordering::Release);
    }
}
