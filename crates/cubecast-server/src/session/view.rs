//! Per-observer entity view: which remote players this client has an
//! entity for, whether each is shown, and the cheapest packet describing
//! how it moved since the last tick.

use std::collections::HashMap;
use std::sync::Arc;

use cubecast_proto::capability::Encoding;
use cubecast_proto::packets::{Move, MoveRotate, Packet, RemoveEntity, Rotate, Teleport};
use cubecast_proto::types::Position;
use cubecast_world::MemberId;
use thiserror::Error;

use super::bandwidth::BandwidthProfile;
use super::slots::SlotPool;
use crate::rank::Rank;

/// Where hidden entities are parked, well below any map.
pub const HIDDEN: Position = Position::new(0, i16::MIN, 0, 0, 0);

const SKIP_MOVEMENT_SQUARED: i64 = 64;
const SKIP_ROTATION_SQUARED: i64 = 1500;

/// Whether a viewer of `viewer` rank may see a player at all.
pub fn can_see(viewer: &Rank, other_hidden: bool, other_rank: &Rank) -> bool {
    !other_hidden || viewer.can_see(other_rank)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ViewError {
    #[error("observer ran out of entity ids")]
    SlotsExhausted,
}

/// What the view needs to know about one remote player this tick.
#[derive(Debug, Clone)]
pub struct EntitySnapshot {
    pub id: MemberId,
    /// Colored name shown above the entity.
    pub name: String,
    pub skin: String,
    pub rank: Arc<Rank>,
    pub model: String,
    pub position: Position,
    pub hidden: bool,
    pub spectating: Option<MemberId>,
}

#[derive(Debug, Clone)]
pub struct ObserverSnapshot {
    pub id: MemberId,
    pub rank: Arc<Rank>,
    pub position: Position,
    pub spectating: Option<MemberId>,
}

#[derive(Debug, Clone)]
struct VisibleEntity {
    slot: u8,
    last_position: Position,
    rank: String,
    hidden: bool,
    retained: bool,
    skipped_last: bool,
}

impl VisibleEntity {
    fn new(slot: u8, rank: &str) -> Self {
        Self {
            slot,
            last_position: HIDDEN,
            rank: rank.to_string(),
            hidden: true,
            retained: true,
            skipped_last: false,
        }
    }

    fn show(&mut self, position: Position, out: &mut Vec<Packet>) {
        self.hidden = false;
        self.last_position = position;
        out.push(Packet::encode(&Teleport::new(self.slot, position)));
    }

    fn hide(&mut self, out: &mut Vec<Packet>) {
        self.hidden = true;
        self.last_position = HIDDEN;
        out.push(Packet::encode(&Teleport::new(self.slot, HIDDEN)));
    }

    fn move_to(
        &mut self,
        position: Position,
        profile: &BandwidthProfile,
        force_full: bool,
        out: &mut Vec<Packet>,
    ) {
        let delta = self.last_position.delta_to(position);
        if delta.is_zero() {
            return;
        }
        if profile.skip_updates {
            if delta.distance_squared() < SKIP_MOVEMENT_SQUARED
                && delta.rotation_squared() < SKIP_ROTATION_SQUARED
                && !self.skipped_last
            {
                self.skipped_last = true;
                return;
            }
            self.skipped_last = false;
        }

        let slot = self.slot;
        let packet = if profile.partial_updates && delta.fits_compact() && !force_full {
            match (delta.position_changed(), delta.rotation_changed()) {
                (true, true) => Packet::encode(&MoveRotate {
                    id: slot,
                    dx: delta.dx as i8,
                    dy: delta.dy as i8,
                    dz: delta.dz as i8,
                    yaw: position.yaw,
                    pitch: position.pitch,
                }),
                (true, false) => Packet::encode(&Move {
                    id: slot,
                    dx: delta.dx as i8,
                    dy: delta.dy as i8,
                    dz: delta.dz as i8,
                }),
                (false, true) => Packet::encode(&Rotate {
                    id: slot,
                    yaw: position.yaw,
                    pitch: position.pitch,
                }),
                (false, false) => return,
            }
        } else {
            Packet::encode(&Teleport::new(slot, position))
        };
        self.last_position = position;
        out.push(packet);
    }
}

/// Spawn an entity for `other` in `slot`, then park it at `initial`.
fn add_packets(
    enc: &Encoding,
    slot: u8,
    other: &EntitySnapshot,
    spawn: Position,
    initial: Position,
    out: &mut Vec<Packet>,
) {
    out.push(enc.add_entity(slot, &other.name, &other.skin, spawn));
    out.push(Packet::encode(&Teleport::new(slot, initial)));
    if !other.model.eq_ignore_ascii_case("humanoid") {
        out.extend(enc.change_model(slot, &other.model));
    }
}

pub struct EntityView {
    entities: HashMap<MemberId, VisibleEntity>,
    slots: SlotPool,
    profile: BandwidthProfile,
    full_update_interval: u32,
    full_update_counter: u32,
}

impl EntityView {
    pub fn new(profile: BandwidthProfile, full_update_interval: u32) -> Self {
        Self {
            entities: HashMap::new(),
            slots: SlotPool::new(),
            profile,
            full_update_interval: full_update_interval.max(1),
            full_update_counter: 0,
        }
    }

    pub fn profile(&self) -> &BandwidthProfile {
        &self.profile
    }

    pub fn set_profile(&mut self, profile: BandwidthProfile) {
        self.profile = profile;
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn slot_of(&self, member: MemberId) -> Option<u8> {
        self.entities.get(&member).map(|e| e.slot)
    }

    pub fn is_shown(&self, member: MemberId) -> Option<bool> {
        self.entities.get(&member).map(|e| !e.hidden)
    }

    /// Remove every entity and free all ids.
    pub fn reset(&mut self, out: &mut Vec<Packet>) {
        for entity in self.entities.values() {
            out.push(Packet::encode(&RemoveEntity { id: entity.slot }));
        }
        self.entities.clear();
        self.slots.reset();
    }

    /// One view-sync pass over the players sharing the observer's world.
    pub fn tick(
        &mut self,
        observer: &ObserverSnapshot,
        others: &[EntitySnapshot],
        enc: &Encoding,
        spawn: Position,
        out: &mut Vec<Packet>,
    ) -> Result<(), ViewError> {
        self.full_update_counter += 1;
        let force_full = self.full_update_counter >= self.full_update_interval;
        let profile = self.profile;

        for other in others {
            if other.id == observer.id || !can_see(&observer.rank, other.hidden, &other.rank) {
                continue;
            }

            let entity = match self.entities.entry(other.id) {
                std::collections::hash_map::Entry::Occupied(slot) => {
                    let entity = slot.into_mut();
                    entity.retained = true;
                    entity
                }
                std::collections::hash_map::Entry::Vacant(vacant) => {
                    let slot = self.slots.allocate().ok_or(ViewError::SlotsExhausted)?;
                    add_packets(enc, slot, other, spawn, HIDDEN, out);
                    vacant.insert(VisibleEntity::new(slot, &other.rank.name))
                }
            };

            if entity.rank != other.rank.name {
                out.push(Packet::encode(&RemoveEntity { id: entity.slot }));
                let initial = if entity.hidden { HIDDEN } else { other.position };
                add_packets(enc, entity.slot, other, spawn, initial, out);
                entity.rank = other.rank.name.clone();
                entity.last_position = initial;
            }

            // Whoever the observer spectates, or is spectated by, stays hidden.
            let spectate_link = observer.spectating == Some(other.id)
                || other.spectating == Some(observer.id);
            if spectate_link {
                if !entity.hidden {
                    entity.hide(out);
                }
                continue;
            }

            let distance = observer.position.distance_squared(other.position);
            let move_visible = other.spectating.is_none() || observer.rank.can_see(&other.rank);
            if entity.hidden {
                if distance < profile.show_threshold && move_visible {
                    entity.show(other.position, out);
                }
            } else if distance > profile.hide_threshold || !move_visible {
                entity.hide(out);
            } else if entity.last_position != other.position {
                entity.move_to(other.position, &profile, force_full, out);
            }
        }

        let slots = &mut self.slots;
        self.entities.retain(|_, entity| {
            if entity.retained {
                entity.retained = false;
                return true;
            }
            out.push(Packet::encode(&RemoveEntity { id: entity.slot }));
            slots.release(entity.slot);
            false
        });

        if force_full {
            self.full_update_counter = 0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Buf;
    use cubecast_proto::codec::ProtoDecode;
    use cubecast_proto::packets::id;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;

    use crate::session::bandwidth::BandwidthMode;

    fn rank(name: &str, level: u8) -> Arc<Rank> {
        Arc::new(Rank {
            name: name.into(),
            color: "&f".into(),
            level,
            permissions: HashSet::new(),
        })
    }

    fn observer(position: Position) -> ObserverSnapshot {
        ObserverSnapshot {
            id: 1,
            rank: rank("guest", 0),
            position,
            spectating: None,
        }
    }

    fn entity(id: MemberId, position: Position) -> EntitySnapshot {
        EntitySnapshot {
            id,
            name: format!("&fplayer{id}"),
            skin: format!("player{id}"),
            rank: rank("guest", 0),
            model: "humanoid".into(),
            position,
            hidden: false,
            spectating: None,
        }
    }

    fn view(mode: BandwidthMode) -> EntityView {
        EntityView::new(mode.profile(), 20)
    }

    fn opcodes(packets: &[Packet]) -> Vec<u8> {
        packets.iter().map(Packet::opcode).collect()
    }

    fn teleport_of(packet: &Packet) -> Teleport {
        let mut bytes = packet.bytes().clone();
        bytes.advance(1);
        Teleport::proto_decode(&mut bytes).unwrap()
    }

    fn tick(view: &mut EntityView, obs: &ObserverSnapshot, others: &[EntitySnapshot]) -> Vec<Packet> {
        let mut out = Vec::new();
        view.tick(obs, others, &Encoding::default(), Position::ZERO, &mut out)
            .unwrap();
        out
    }

    #[test]
    fn nearby_player_is_added_and_shown() {
        let mut view = view(BandwidthMode::Normal);
        let obs = observer(Position::new(100, 64, 100, 0, 0));
        let target = entity(2, Position::new(110, 64, 100, 0, 0));
        let out = tick(&mut view, &obs, &[target.clone()]);

        assert_eq!(
            opcodes(&out),
            vec![id::ADD_ENTITY, id::TELEPORT, id::TELEPORT]
        );
        let last = teleport_of(out.last().unwrap());
        assert_eq!(last.position, target.position);
        assert_eq!(Some(last.id), view.slot_of(2));
        assert_eq!(view.is_shown(2), Some(true));
    }

    #[test]
    fn distant_player_stays_hidden() {
        let mut view = view(BandwidthMode::VeryLow);
        let obs = observer(Position::ZERO);
        let far = entity(2, Position::new(5000, 0, 0, 0, 0));
        let out = tick(&mut view, &obs, &[far]);
        assert_eq!(opcodes(&out), vec![id::ADD_ENTITY, id::TELEPORT]);
        assert_eq!(teleport_of(&out[1]).position, HIDDEN);
        assert_eq!(view.is_shown(2), Some(false));
    }

    #[test]
    fn same_position_twice_emits_nothing() {
        let mut view = view(BandwidthMode::Normal);
        let obs = observer(Position::ZERO);
        let target = entity(2, Position::new(10, 0, 0, 0, 0));
        tick(&mut view, &obs, &[target.clone()]);
        assert!(tick(&mut view, &obs, &[target]).is_empty());
    }

    #[test]
    fn movement_uses_compact_packets() {
        let mut view = view(BandwidthMode::Normal);
        let obs = observer(Position::ZERO);
        let mut target = entity(2, Position::new(10, 0, 0, 0, 0));
        tick(&mut view, &obs, &[target.clone()]);

        target.position = Position::new(12, 0, 0, 0, 0);
        assert_eq!(opcodes(&tick(&mut view, &obs, &[target.clone()])), vec![id::MOVE]);

        target.position = Position::new(12, 0, 0, 64, 0);
        assert_eq!(opcodes(&tick(&mut view, &obs, &[target.clone()])), vec![id::ROTATE]);

        target.position = Position::new(14, 1, 0, 32, 0);
        assert_eq!(
            opcodes(&tick(&mut view, &obs, &[target.clone()])),
            vec![id::MOVE_ROTATE]
        );

        target.position = Position::new(400, 1, 0, 32, 0);
        assert_eq!(opcodes(&tick(&mut view, &obs, &[target])), vec![id::TELEPORT]);
    }

    #[test]
    fn full_update_is_forced_periodically() {
        let mut view = EntityView::new(BandwidthMode::Normal.profile(), 3);
        let obs = observer(Position::ZERO);
        let mut target = entity(2, Position::new(10, 0, 0, 0, 0));
        // tick 1 adds
        tick(&mut view, &obs, &[target.clone()]);
        target.position.x += 1;
        assert_eq!(opcodes(&tick(&mut view, &obs, &[target.clone()])), vec![id::MOVE]);
        target.position.x += 1;
        assert_eq!(opcodes(&tick(&mut view, &obs, &[target.clone()])), vec![id::TELEPORT]);
        target.position.x += 1;
        assert_eq!(opcodes(&tick(&mut view, &obs, &[target])), vec![id::MOVE]);
    }

    #[test]
    fn skip_mode_never_drops_two_in_a_row() {
        let mut view = view(BandwidthMode::VeryLow);
        let obs = observer(Position::ZERO);
        let mut target = entity(2, Position::new(10, 0, 0, 0, 0));
        tick(&mut view, &obs, &[target.clone()]);

        let mut sent = Vec::new();
        for _ in 0..6 {
            target.position.x += 1;
            sent.push(!tick(&mut view, &obs, &[target.clone()]).is_empty());
        }
        assert_eq!(sent, vec![false, true, false, true, false, true]);
    }

    #[test]
    fn moving_away_hides_and_back_shows() {
        let mut view = view(BandwidthMode::VeryLow);
        let obs = observer(Position::ZERO);
        let mut target = entity(2, Position::new(100, 0, 0, 0, 0));
        tick(&mut view, &obs, &[target.clone()]);
        assert_eq!(view.is_shown(2), Some(true));

        target.position = Position::new(1400, 0, 0, 0, 0);
        let out = tick(&mut view, &obs, &[target.clone()]);
        assert_eq!(teleport_of(&out[0]).position, HIDDEN);
        assert_eq!(view.is_shown(2), Some(false));

        target.position = Position::new(200, 0, 0, 0, 0);
        let out = tick(&mut view, &obs, &[target.clone()]);
        assert_eq!(teleport_of(&out[0]).position, target.position);
        assert_eq!(view.is_shown(2), Some(true));
    }

    #[test]
    fn departed_player_is_removed() {
        let mut view = view(BandwidthMode::Normal);
        let obs = observer(Position::ZERO);
        tick(&mut view, &obs, &[entity(2, Position::ZERO), entity(3, Position::ZERO)]);
        let slot = view.slot_of(3).unwrap();

        let out = tick(&mut view, &obs, &[entity(2, Position::ZERO)]);
        assert_eq!(opcodes(&out), vec![id::REMOVE_ENTITY]);
        assert_eq!(out[0].bytes()[1], slot);
        assert_eq!(view.len(), 1);
        assert!(view.slot_of(3).is_none());
    }

    #[test]
    fn rank_change_readds_entity() {
        let mut view = view(BandwidthMode::Normal);
        let obs = observer(Position::ZERO);
        let mut target = entity(2, Position::new(10, 0, 0, 0, 0));
        tick(&mut view, &obs, &[target.clone()]);

        target.rank = rank("builder", 10);
        let out = tick(&mut view, &obs, &[target.clone()]);
        assert_eq!(
            opcodes(&out),
            vec![id::REMOVE_ENTITY, id::ADD_ENTITY, id::TELEPORT]
        );
        assert_eq!(teleport_of(&out[2]).position, target.position);
        assert!(tick(&mut view, &obs, &[target]).is_empty());
    }

    #[test]
    fn hidden_players_need_higher_rank() {
        let mut view = view(BandwidthMode::Normal);
        let mut target = entity(2, Position::ZERO);
        target.hidden = true;

        assert!(tick(&mut view, &observer(Position::ZERO), &[target.clone()]).is_empty());

        let mut op = observer(Position::ZERO);
        op.rank = rank("op", 100);
        assert!(!tick(&mut view, &op, &[target]).is_empty());
        assert!(view.slot_of(2).is_some());
    }

    #[test]
    fn spectate_links_force_hide() {
        let mut view = view(BandwidthMode::Normal);
        let mut obs = observer(Position::ZERO);
        let target = entity(2, Position::new(5, 0, 0, 0, 0));
        tick(&mut view, &obs, &[target.clone()]);
        assert_eq!(view.is_shown(2), Some(true));

        obs.spectating = Some(2);
        let out = tick(&mut view, &obs, &[target.clone()]);
        assert_eq!(teleport_of(&out[0]).position, HIDDEN);
        assert_eq!(view.is_shown(2), Some(false));
        assert!(tick(&mut view, &obs, &[target]).is_empty());
    }

    #[test]
    fn spectating_players_hidden_from_equal_rank() {
        let mut view = view(BandwidthMode::Normal);
        let obs = observer(Position::ZERO);
        let mut target = entity(2, Position::new(5, 0, 0, 0, 0));
        target.spectating = Some(9);
        tick(&mut view, &obs, &[target]);
        assert_eq!(view.is_shown(2), Some(false));
    }

    #[test]
    fn self_is_skipped() {
        let mut view = view(BandwidthMode::Normal);
        let obs = observer(Position::ZERO);
        assert!(tick(&mut view, &obs, &[entity(1, Position::ZERO)]).is_empty());
        assert!(view.is_empty());
    }

    #[test]
    fn reset_removes_everything() {
        let mut view = view(BandwidthMode::Normal);
        let obs = observer(Position::ZERO);
        let others: Vec<_> = (2..12).map(|id| entity(id, Position::ZERO)).collect();
        tick(&mut view, &obs, &others);
        let mut out = Vec::new();
        view.reset(&mut out);
        assert_eq!(out.len(), 10);
        assert!(out.iter().all(|p| p.opcode() == id::REMOVE_ENTITY));
        assert!(view.is_empty());
    }

    #[test]
    fn more_than_127_players_exhausts_slots() {
        let mut view = view(BandwidthMode::Normal);
        let obs = observer(Position::ZERO);
        let others: Vec<_> = (2..=129).map(|id| entity(id, Position::ZERO)).collect();
        let mut out = Vec::new();
        assert_eq!(
            view.tick(&obs, &others, &Encoding::default(), Position::ZERO, &mut out),
            Err(ViewError::SlotsExhausted)
        );
    }

    #[test]
    fn random_join_leave_keeps_slot_invariants() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut view = view(BandwidthMode::Normal);
        let obs = observer(Position::ZERO);
        let mut present: Vec<MemberId> = Vec::new();

        for _ in 0..2_000 {
            if present.len() < 127 && (present.is_empty() || rng.gen_bool(0.5)) {
                let id = rng.gen_range(2..1000);
                if !present.contains(&id) {
                    present.push(id);
                }
            } else {
                let idx = rng.gen_range(0..present.len());
                present.swap_remove(idx);
            }
            let others: Vec<_> = present
                .iter()
                .map(|&id| {
                    let x = rng.gen_range(-3000..3000);
                    entity(id, Position::new(x, 0, 0, 0, 0))
                })
                .collect();
            tick(&mut view, &obs, &others);

            assert_eq!(view.len(), present.len());
            let mut slots = HashSet::new();
            for &id in &present {
                let slot = view.slot_of(id).unwrap();
                assert!((1..=127).contains(&slot));
                assert!(slots.insert(slot), "slot {slot} shared");
            }
        }
    }
}
