//! # Delta-Replicated Group Entity
//!
//! A group is shared mutable state observed by every member's client. The
//! entity publishes a baseline (full encode of all fields) to each new
//! observer, then keeps observers current by emitting deltas addressed to
//! named slots whenever a field changes - unchanged state is never resent.
//!
//! ## State machine
//! `Unformed -> Formed -> Disbanded`, with the forming transition allowed
//! exactly once. Membership mutations are a single critical section around
//! the whole read-modify-notify sequence: the unique-membership index, the
//! derived level, the emitted deltas, and each member's back-reference all
//! reflect one consistent membership snapshot. Reads hand out snapshots,
//! never live views.
//!
//! ## Ordering convention
//! `members[0]` is the leader. Leader reassignment is a positional swap, not
//! removal plus reinsertion, so the first-element-is-leader convention holds
//! through the members-slot delta stream.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{ProtocolError, Result};
use crate::replication::baseline::BaselineBuilder;
use crate::replication::observer::{ObserverSet, ReplicationEvent};

/// Fixed member capacity.
pub const GROUP_CAPACITY: usize = 8;

/// Delta slot indices within the group baseline.
pub mod slots {
    pub const MEMBERS: u16 = 2;
    pub const LEVEL: u16 = 5;
    pub const LOOT_MASTER: u16 = 7;
    pub const LOOT_RULE: u16 = 8;
}

/// Loot distribution rule, replicated on its own slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LootRule {
    FreeForAll,
    MasterLooter,
    Lottery,
    #[default]
    Random,
}

impl LootRule {
    pub fn id(self) -> u32 {
        match self {
            LootRule::FreeForAll => 0,
            LootRule::MasterLooter => 1,
            LootRule::Lottery => 2,
            LootRule::Random => 3,
        }
    }

    pub fn from_id(id: u32) -> Option<LootRule> {
        match id {
            0 => Some(LootRule::FreeForAll),
            1 => Some(LootRule::MasterLooter),
            2 => Some(LootRule::Lottery),
            3 => Some(LootRule::Random),
            _ => None,
        }
    }
}

/// Shared handle to a groupable game object.
///
/// The back-reference records which group the object currently belongs to
/// (0 = none) and is what rejects double membership, including across
/// distinct group instances.
#[derive(Debug)]
pub struct Member {
    id: u64,
    name: String,
    level: u16,
    group_id: AtomicU64,
}

impl Member {
    pub fn new(id: u64, name: impl Into<String>, level: u16) -> Arc<Member> {
        Arc::new(Member {
            id,
            name: name.into(),
            level,
            group_id: AtomicU64::new(0),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> u16 {
        self.level
    }

    /// Group this member currently belongs to, 0 if none.
    pub fn group_id(&self) -> u64 {
        self.group_id.load(Ordering::Acquire)
    }
}

/// Lifecycle phase; `Disbanded` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupPhase {
    Unformed,
    Formed,
    Disbanded,
}

struct GroupState {
    phase: GroupPhase,
    members: Vec<Arc<Member>>,
    index: HashMap<u64, Arc<Member>>,
    update_count: u32,
    level: u16,
    loot_rule: LootRule,
    loot_master: u64,
}

/// The replicated group entity.
pub struct Group {
    object_id: u64,
    state: Mutex<GroupState>,
    observers: ObserverSet,
}

impl Group {
    pub fn new(object_id: u64) -> Group {
        Group {
            object_id,
            state: Mutex::new(GroupState {
                phase: GroupPhase::Unformed,
                members: Vec::new(),
                index: HashMap::new(),
                update_count: 0,
                level: 0,
                loot_rule: LootRule::default(),
                loot_master: 0,
            }),
            observers: ObserverSet::new(),
        }
    }

    pub fn object_id(&self) -> u64 {
        self.object_id
    }

    /// Form the group with a leader and one other member.
    ///
    /// Allowed exactly once: reforming - even after a disband - is an
    /// `InvalidState` error.
    pub fn form(&self, leader: &Arc<Member>, member: &Arc<Member>) -> Result<()> {
        let mut state = self.lock()?;
        match state.phase {
            GroupPhase::Unformed => {}
            GroupPhase::Formed => {
                return Err(ProtocolError::InvalidState("group already formed".to_string()))
            }
            GroupPhase::Disbanded => {
                return Err(ProtocolError::InvalidState("group disbanded".to_string()))
            }
        }

        self.claim(&mut state, leader)?;
        if let Err(e) = self.claim(&mut state, member) {
            // No partial mutation: release the leader again.
            self.release(&mut state, leader.id());
            return Err(e);
        }
        state.phase = GroupPhase::Formed;
        debug!(
            object_id = self.object_id,
            leader = leader.id(),
            "group formed"
        );
        self.notify_members_changed(&mut state);
        Ok(())
    }

    /// Add one member to a formed group.
    pub fn add_member(&self, member: &Arc<Member>) -> Result<()> {
        let mut state = self.lock()?;
        self.ensure_formed(&state)?;
        if state.members.len() >= GROUP_CAPACITY {
            return Err(ProtocolError::CapacityExceeded {
                limit: GROUP_CAPACITY,
            });
        }
        self.claim(&mut state, member)?;
        self.notify_members_changed(&mut state);
        Ok(())
    }

    /// Remove a member by id.
    ///
    /// Removing the leader of a group that keeps at least one member
    /// promotes the next member in positional order via a positional swap.
    pub fn remove_member(&self, member_id: u64) -> Result<()> {
        let mut state = self.lock()?;
        self.ensure_formed(&state)?;
        if !state.index.contains_key(&member_id) {
            return Err(ProtocolError::InvalidState(format!(
                "not a member: {member_id}"
            )));
        }

        if state.members[0].id() == member_id && state.members.len() >= 2 {
            // Promote members[1] by swapping it into the leader position;
            // the outgoing leader now sits at index 1.
            state.members.swap(0, 1);
            state.update_count += 1;
            self.emit_members_delta(&state);
        }

        self.release(&mut state, member_id);
        self.notify_members_changed(&mut state);
        Ok(())
    }

    /// Remove every member and retire the entity.
    ///
    /// Atomic relative to concurrent add/remove: no membership mutation can
    /// interleave with the disband.
    pub fn disband(&self) -> Result<()> {
        let mut state = self.lock()?;
        self.ensure_formed(&state)?;

        for member in state.members.drain(..) {
            member.group_id.store(0, Ordering::Release);
        }
        state.index.clear();
        state.phase = GroupPhase::Disbanded;
        debug!(object_id = self.object_id, "group disbanded");
        self.notify_members_changed(&mut state);
        Ok(())
    }

    pub fn set_loot_rule(&self, rule: LootRule) -> Result<()> {
        let mut state = self.lock()?;
        state.loot_rule = rule;
        let mut payload = BytesMut::with_capacity(4);
        payload.put_u32_le(rule.id());
        self.emit_delta(slots::LOOT_RULE, payload.freeze());
        Ok(())
    }

    pub fn set_loot_master(&self, member_id: u64) -> Result<()> {
        let mut state = self.lock()?;
        state.loot_master = member_id;
        let mut payload = BytesMut::with_capacity(8);
        payload.put_u64_le(member_id);
        self.emit_delta(slots::LOOT_MASTER, payload.freeze());
        Ok(())
    }

    pub fn phase(&self) -> GroupPhase {
        self.lock().map(|s| s.phase).unwrap_or(GroupPhase::Disbanded)
    }

    pub fn size(&self) -> usize {
        self.lock().map(|s| s.members.len()).unwrap_or(0)
    }

    pub fn is_full(&self) -> bool {
        self.size() >= GROUP_CAPACITY
    }

    /// Derived level: the maximum level among current members.
    pub fn level(&self) -> u16 {
        self.lock().map(|s| s.level).unwrap_or(0)
    }

    pub fn loot_rule(&self) -> LootRule {
        self.lock().map(|s| s.loot_rule).unwrap_or_default()
    }

    pub fn loot_master(&self) -> u64 {
        self.lock().map(|s| s.loot_master).unwrap_or(0)
    }

    pub fn leader_id(&self) -> Option<u64> {
        self.lock()
            .ok()
            .and_then(|s| s.members.first().map(|m| m.id()))
    }

    /// Snapshot of the member handles in positional order.
    pub fn members(&self) -> Vec<Arc<Member>> {
        self.lock().map(|s| s.members.clone()).unwrap_or_default()
    }

    /// Snapshot of member names to ids.
    pub fn member_names(&self) -> HashMap<String, u64> {
        self.lock()
            .map(|s| {
                s.members
                    .iter()
                    .map(|m| (m.name().to_string(), m.id()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Register an observer; it receives the baseline immediately, then
    /// deltas for as long as it stays subscribed.
    pub fn subscribe(&self, observer_id: u64) -> Result<mpsc::UnboundedReceiver<ReplicationEvent>> {
        let state = self.lock()?;
        let rx = self.observers.subscribe(observer_id);
        crate::utils::metrics::global_metrics().baseline_sent();
        self.observers.send_to(
            observer_id,
            ReplicationEvent::Baseline {
                object_id: self.object_id,
                payload: self.encode_baseline(&state),
            },
        );
        Ok(rx)
    }

    pub fn unsubscribe(&self, observer_id: u64) {
        self.observers.unsubscribe(observer_id);
    }

    /// Full-state snapshot of every replicated field.
    pub fn baseline(&self) -> Result<Bytes> {
        let state = self.lock()?;
        Ok(self.encode_baseline(&state))
    }

    fn lock(&self) -> Result<MutexGuard<'_, GroupState>> {
        self.state
            .lock()
            .map_err(|_| ProtocolError::InvalidState("group state lock poisoned".to_string()))
    }

    fn ensure_formed(&self, state: &GroupState) -> Result<()> {
        match state.phase {
            GroupPhase::Formed => Ok(()),
            GroupPhase::Unformed => {
                Err(ProtocolError::InvalidState("group not formed".to_string()))
            }
            GroupPhase::Disbanded => {
                Err(ProtocolError::InvalidState("group disbanded".to_string()))
            }
        }
    }

    /// Append one member: back-reference claim first, then index and list.
    ///
    /// The claim is a compare-exchange on the member's back-reference so a
    /// concurrent claim by another group cannot double-admit the object.
    fn claim(&self, state: &mut GroupState, member: &Arc<Member>) -> Result<()> {
        if state.index.contains_key(&member.id()) {
            return Err(ProtocolError::InvalidState(format!(
                "member {} already grouped",
                member.id()
            )));
        }
        member
            .group_id
            .compare_exchange(0, self.object_id, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                ProtocolError::InvalidState(format!("member {} already grouped", member.id()))
            })?;
        state.index.insert(member.id(), member.clone());
        state.members.push(member.clone());
        Ok(())
    }

    fn release(&self, state: &mut GroupState, member_id: u64) {
        if let Some(member) = state.index.remove(&member_id) {
            member.group_id.store(0, Ordering::Release);
            state.members.retain(|m| m.id() != member_id);
        }
    }

    /// Post-mutation bookkeeping: members delta, derived level, level delta.
    fn notify_members_changed(&self, state: &mut GroupState) {
        state.update_count += 1;
        self.emit_members_delta(state);

        let level = state.members.iter().map(|m| m.level()).max().unwrap_or(0);
        state.level = level;
        let mut payload = BytesMut::with_capacity(2);
        payload.put_u16_le(level);
        self.emit_delta(slots::LEVEL, payload.freeze());
    }

    fn emit_members_delta(&self, state: &GroupState) {
        self.emit_delta(slots::MEMBERS, Self::encode_members(state));
    }

    fn emit_delta(&self, slot: u16, payload: Bytes) {
        crate::utils::metrics::global_metrics().delta_emitted();
        self.observers.broadcast(&ReplicationEvent::Delta {
            object_id: self.object_id,
            slot,
            payload,
        });
    }

    /// Members list: size, update counter, then id + name per member.
    fn encode_members(state: &GroupState) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u32_le(state.members.len() as u32);
        out.put_u32_le(state.update_count);
        for member in &state.members {
            out.put_u64_le(member.id());
            out.put_u16_le(member.name().len() as u16);
            out.put_slice(member.name().as_bytes());
        }
        out.freeze()
    }

    fn encode_baseline(&self, state: &GroupState) -> Bytes {
        let mut bb = BaselineBuilder::new();
        bb.add_bytes(&Self::encode_members(state));
        bb.add_u16(state.level);
        bb.add_u64(state.loot_master);
        bb.add_u32(state.loot_rule.id());
        bb.increment_operand_count(4);
        bb.finish()
    }
}
