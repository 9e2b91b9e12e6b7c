//! Mutable runtime state of one NM channel.
//!
//! The runtime is plain data: it is created uninitialised, loaded by
//! [`ChannelRuntime::init`] from the channel configuration and then mutated
//! only by the state machine and the facade.
use crate::config::{ChannelConfig, NmGlobalConfig};
use crate::core::{NmMode, NmState, MAX_RX_PDU_HISTORY};
use crate::infra::codec::cbv;
use crate::protocol::managment::timer::{ChannelTimers, TimerKind};
use crate::protocol::transport::nm_pdu::NmPdu;

/// Filler for user-data bytes never written by the application.
pub const USER_DATA_FILL: u8 = 0xFF;

//==================================================================================RX_HISTORY
/// Ring of the last received NM PDUs.
///
/// The ring holds exactly `capacity` entries; once full, every new PDU
/// overwrites the oldest one.
#[derive(Debug, Clone, Copy)]
pub struct RxHistory {
    slots: [NmPdu; MAX_RX_PDU_HISTORY],
    capacity: usize,
    last: Option<usize>,
    stored: usize,
}

impl RxHistory {
    /// Empty ring of `capacity` entries, clamped to `1..=MAX_RX_PDU_HISTORY`.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: [NmPdu::new(); MAX_RX_PDU_HISTORY],
            capacity: capacity.clamp(1, MAX_RX_PDU_HISTORY),
            last: None,
            stored: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of PDUs currently stored.
    pub fn len(&self) -> usize {
        self.stored
    }

    pub fn is_empty(&self) -> bool {
        self.stored == 0
    }

    /// Store `data` in the next slot, overwriting the oldest entry when full.
    pub fn push(&mut self, data: &[u8]) {
        let next = match self.last {
            Some(index) => (index + 1) % self.capacity,
            None => 0,
        };
        self.slots[next].copy_from(data);
        self.last = Some(next);
        self.stored = (self.stored + 1).min(self.capacity);
    }

    /// Most recently received PDU.
    pub fn latest(&self) -> Option<&NmPdu> {
        self.last.map(|index| &self.slots[index])
    }

    /// Stored PDUs, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &NmPdu> + '_ {
        let last = self.last.unwrap_or(0);
        let start = (last + 1 + self.capacity - self.stored) % self.capacity;
        (0..self.stored).map(move |i| &self.slots[(start + i) % self.capacity])
    }

    pub fn clear(&mut self) {
        self.last = None;
        self.stored = 0;
    }
}

//==================================================================================CHANNEL_RUNTIME
/// Runtime state of a channel.
#[derive(Debug, Clone, Copy)]
pub struct ChannelRuntime {
    pub(crate) mode: NmMode,
    pub(crate) state: NmState,
    /// Network requested by the local application.
    pub(crate) requested: bool,
    pub(crate) tx_enabled: bool,
    /// Communication disabled by the application until enabled again.
    pub(crate) comm_disabled: bool,
    pub(crate) bus_load_reduction_active: bool,
    /// Remote sleep has been indicated and not cancelled yet.
    pub(crate) remote_sleep_ind: bool,
    /// Remote sleep detection active (cleared while communication is disabled).
    pub(crate) remote_sleep_ind_enabled: bool,
    pub(crate) pn_filter_enabled: bool,
    /// Coordinator ready-to-sleep has been indicated and not cancelled yet.
    pub(crate) coord_ready_to_sleep: bool,
    /// Immediate transmissions left in the current burst.
    pub(crate) immediate_transmissions: u8,
    /// Outcome of the previous message-cycle transmission.
    pub(crate) last_tx_failed: bool,
    pub(crate) timers: ChannelTimers,
    pub(crate) tx_pdu: NmPdu,
    pub(crate) rx_history: RxHistory,
}

impl Default for ChannelRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRuntime {
    /// Uninitialised runtime.
    pub fn new() -> Self {
        Self {
            mode: NmMode::BusSleep,
            state: NmState::Uninit,
            requested: false,
            tx_enabled: false,
            comm_disabled: false,
            bus_load_reduction_active: false,
            remote_sleep_ind: false,
            remote_sleep_ind_enabled: false,
            pn_filter_enabled: false,
            coord_ready_to_sleep: false,
            immediate_transmissions: 0,
            last_tx_failed: false,
            timers: ChannelTimers::new(),
            tx_pdu: NmPdu::new(),
            rx_history: RxHistory::new(1),
        }
    }

    /// Load the initial state: bus sleep, timers stopped, transmit PDU prepared.
    pub fn init(&mut self, config: &ChannelConfig, global: &NmGlobalConfig) {
        *self = Self {
            mode: NmMode::BusSleep,
            state: NmState::BusSleep,
            remote_sleep_ind_enabled: global.remote_sleep_ind_enabled,
            rx_history: RxHistory::new(config.rx_pdu_count()),
            ..Self::new()
        };

        self.tx_pdu = NmPdu::filled(config.pdu_length(), USER_DATA_FILL);
        cbv::clear(self.tx_pdu.as_mut_slice(), config.cbv_position());
        if config.node_id_enabled() {
            if let Some(index) = config.nid_position().index() {
                self.tx_pdu.as_mut_slice()[index] = config.node_id();
            }
        }
    }

    /// Back to the uninitialised state.
    pub fn deinit(&mut self) {
        *self = Self::new();
    }

    pub fn mode(&self) -> NmMode {
        self.mode
    }

    pub fn state(&self) -> NmState {
        self.state
    }

    pub fn is_requested(&self) -> bool {
        self.requested
    }

    pub fn is_tx_enabled(&self) -> bool {
        self.tx_enabled
    }

    pub fn is_communication_disabled(&self) -> bool {
        self.comm_disabled
    }

    pub fn is_bus_load_reduction_active(&self) -> bool {
        self.bus_load_reduction_active
    }

    pub fn is_remote_sleep_indicated(&self) -> bool {
        self.remote_sleep_ind
    }

    pub fn is_pn_filter_enabled(&self) -> bool {
        self.pn_filter_enabled
    }

    pub fn immediate_transmissions(&self) -> u8 {
        self.immediate_transmissions
    }

    /// `true` when the given timer is counting down.
    pub fn is_timer_running(&self, kind: TimerKind) -> bool {
        self.timers.get(kind).is_running()
    }

    /// `true` when no timer is counting down.
    pub fn all_timers_stopped(&self) -> bool {
        TimerKind::ALL.iter().all(|kind| !self.is_timer_running(*kind))
    }

    /// PDU that the next transmission will carry.
    pub fn tx_pdu(&self) -> &NmPdu {
        &self.tx_pdu
    }

    pub fn rx_history(&self) -> &RxHistory {
        &self.rx_history
    }
}
