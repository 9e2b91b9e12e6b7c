//! Read-only configuration consumed by the engine.
//!
//! Channels are described with [`ChannelConfigBuilder`], a fluent builder that
//! validates the PDU layout once and precomputes the user-data window. Global
//! switches live in [`NmGlobalConfig`], and [`NmConfig`] bundles both.
//!
//! ```
//! use embassy_time::Duration;
//! use korri_cannm::config::{ChannelConfig, NmConfig, NmGlobalConfig};
//! use korri_cannm::core::{PduBytePosition, PduId};
//!
//! let channel = ChannelConfig::builder(PduId(0x10), PduId(0x20))
//!     .node_id(0x2A)
//!     .node_id_enabled(true)
//!     .node_detection(true)
//!     .cbv_position(PduBytePosition::Byte1)
//!     .nid_position(PduBytePosition::Byte0)
//!     .msg_cycle_time(Duration::from_millis(100))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(channel.user_data_layout().offset, 2);
//! assert_eq!(channel.user_data_layout().len, 6);
//!
//! let config = NmConfig::new(NmGlobalConfig::default(), [channel]).unwrap();
//! assert_eq!(config.channels().len(), 1);
//! ```
use embassy_time::Duration;

use crate::core::{
    PduBytePosition, PduId, UserDataLayout, MAX_NM_PDU_BYTES, MAX_RX_PDU_HISTORY,
};
use crate::error::ConfigError;

//==================================================================================CHANNEL_CONFIG
/// Immutable description of one NM channel. Built with [`ChannelConfigBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    node_id: u8,
    node_id_enabled: bool,
    node_detection: bool,
    active_wakeup_bit: bool,
    bus_load_reduction: bool,
    repeat_msg_ind: bool,
    pn_handle_multiple_network_requests: bool,
    immediate_nm_transmissions: u8,
    immediate_nm_cycle_time: Duration,
    timeout_time: Duration,
    msg_cycle_time: Duration,
    msg_cycle_offset: Duration,
    msg_reduced_time: Duration,
    repeat_message_time: Duration,
    wait_bus_sleep_time: Duration,
    remote_sleep_ind_time: Duration,
    nid_position: PduBytePosition,
    cbv_position: PduBytePosition,
    pdu_length: usize,
    rx_pdu_count: usize,
    rx_pdu_id: PduId,
    tx_pdu_id: PduId,
    user_data_pdu_id: Option<PduId>,
    user_data: UserDataLayout,
}

impl ChannelConfig {
    /// Builder entry point for a channel receiving on `rx_pdu_id` and transmitting on `tx_pdu_id`.
    pub const fn builder(rx_pdu_id: PduId, tx_pdu_id: PduId) -> ChannelConfigBuilder {
        ChannelConfigBuilder::new(rx_pdu_id, tx_pdu_id)
    }

    /// Local node identifier written into transmitted PDUs.
    pub const fn node_id(&self) -> u8 {
        self.node_id
    }
    pub const fn node_id_enabled(&self) -> bool {
        self.node_id_enabled
    }
    pub const fn node_detection(&self) -> bool {
        self.node_detection
    }
    pub const fn active_wakeup_bit(&self) -> bool {
        self.active_wakeup_bit
    }
    pub const fn bus_load_reduction(&self) -> bool {
        self.bus_load_reduction
    }
    pub const fn repeat_msg_ind(&self) -> bool {
        self.repeat_msg_ind
    }
    pub const fn pn_handle_multiple_network_requests(&self) -> bool {
        self.pn_handle_multiple_network_requests
    }
    /// Number of fast NM PDUs sent when the channel wakes up actively.
    pub const fn immediate_nm_transmissions(&self) -> u8 {
        self.immediate_nm_transmissions
    }
    pub const fn immediate_nm_cycle_time(&self) -> Duration {
        self.immediate_nm_cycle_time
    }
    pub const fn timeout_time(&self) -> Duration {
        self.timeout_time
    }
    pub const fn msg_cycle_time(&self) -> Duration {
        self.msg_cycle_time
    }
    pub const fn msg_cycle_offset(&self) -> Duration {
        self.msg_cycle_offset
    }
    pub const fn msg_reduced_time(&self) -> Duration {
        self.msg_reduced_time
    }
    pub const fn repeat_message_time(&self) -> Duration {
        self.repeat_message_time
    }
    pub const fn wait_bus_sleep_time(&self) -> Duration {
        self.wait_bus_sleep_time
    }
    pub const fn remote_sleep_ind_time(&self) -> Duration {
        self.remote_sleep_ind_time
    }
    pub const fn nid_position(&self) -> PduBytePosition {
        self.nid_position
    }
    pub const fn cbv_position(&self) -> PduBytePosition {
        self.cbv_position
    }
    /// Length of transmitted and received NM PDUs.
    pub const fn pdu_length(&self) -> usize {
        self.pdu_length
    }
    /// Depth of the receive history ring.
    pub const fn rx_pdu_count(&self) -> usize {
        self.rx_pdu_count
    }
    pub const fn rx_pdu_id(&self) -> PduId {
        self.rx_pdu_id
    }
    pub const fn tx_pdu_id(&self) -> PduId {
        self.tx_pdu_id
    }
    /// PDU identifier used when talking to the user-data router.
    pub const fn user_data_pdu_id(&self) -> Option<PduId> {
        self.user_data_pdu_id
    }
    /// User-data window derived from the enabled optional fields.
    pub const fn user_data_layout(&self) -> UserDataLayout {
        self.user_data
    }
}

//==================================================================================CHANNEL_CONFIG_BUILDER
#[derive(Debug, Clone, Copy)]
/// Fluent builder for [`ChannelConfig`].
///
/// Defaults: eight-byte PDU, node identifier on byte 0, control bit vector on
/// byte 1, every optional behaviour disabled.
pub struct ChannelConfigBuilder {
    inner: ChannelConfig,
}

impl ChannelConfigBuilder {
    /// Create a builder with default timings.
    pub const fn new(rx_pdu_id: PduId, tx_pdu_id: PduId) -> Self {
        Self {
            inner: ChannelConfig {
                node_id: 0,
                node_id_enabled: false,
                node_detection: false,
                active_wakeup_bit: false,
                bus_load_reduction: false,
                repeat_msg_ind: false,
                pn_handle_multiple_network_requests: false,
                immediate_nm_transmissions: 0,
                immediate_nm_cycle_time: Duration::from_millis(20),
                timeout_time: Duration::from_millis(2000),
                msg_cycle_time: Duration::from_millis(100),
                msg_cycle_offset: Duration::from_millis(0),
                msg_reduced_time: Duration::from_millis(50),
                repeat_message_time: Duration::from_millis(1500),
                wait_bus_sleep_time: Duration::from_millis(2000),
                remote_sleep_ind_time: Duration::from_millis(3000),
                nid_position: PduBytePosition::Byte0,
                cbv_position: PduBytePosition::Byte1,
                pdu_length: 8,
                rx_pdu_count: 1,
                rx_pdu_id,
                tx_pdu_id,
                user_data_pdu_id: None,
                user_data: UserDataLayout { offset: 0, len: 0 },
            },
        }
    }

    pub const fn node_id(mut self, node_id: u8) -> Self {
        self.inner.node_id = node_id;
        self
    }
    /// Write the node identifier into transmitted PDUs.
    pub const fn node_id_enabled(mut self, enabled: bool) -> Self {
        self.inner.node_id_enabled = enabled;
        self
    }
    /// Honour repeat-message requests (bit 0 of the control bit vector).
    pub const fn node_detection(mut self, enabled: bool) -> Self {
        self.inner.node_detection = enabled;
        self
    }
    /// Set the active-wakeup bit when the network is requested from sleep.
    pub const fn active_wakeup_bit(mut self, enabled: bool) -> Self {
        self.inner.active_wakeup_bit = enabled;
        self
    }
    /// Switch to the reduced message cycle in normal operation.
    pub const fn bus_load_reduction(mut self, enabled: bool) -> Self {
        self.inner.bus_load_reduction = enabled;
        self
    }
    /// Report received repeat-message requests to the upper layer.
    pub const fn repeat_msg_ind(mut self, enabled: bool) -> Self {
        self.inner.repeat_msg_ind = enabled;
        self
    }
    /// Re-enter repeat message on every network request while awake.
    pub const fn pn_handle_multiple_network_requests(mut self, enabled: bool) -> Self {
        self.inner.pn_handle_multiple_network_requests = enabled;
        self
    }
    pub const fn immediate_nm_transmissions(mut self, count: u8) -> Self {
        self.inner.immediate_nm_transmissions = count;
        self
    }
    pub const fn immediate_nm_cycle_time(mut self, time: Duration) -> Self {
        self.inner.immediate_nm_cycle_time = time;
        self
    }
    pub const fn timeout_time(mut self, time: Duration) -> Self {
        self.inner.timeout_time = time;
        self
    }
    pub const fn msg_cycle_time(mut self, time: Duration) -> Self {
        self.inner.msg_cycle_time = time;
        self
    }
    pub const fn msg_cycle_offset(mut self, time: Duration) -> Self {
        self.inner.msg_cycle_offset = time;
        self
    }
    pub const fn msg_reduced_time(mut self, time: Duration) -> Self {
        self.inner.msg_reduced_time = time;
        self
    }
    pub const fn repeat_message_time(mut self, time: Duration) -> Self {
        self.inner.repeat_message_time = time;
        self
    }
    pub const fn wait_bus_sleep_time(mut self, time: Duration) -> Self {
        self.inner.wait_bus_sleep_time = time;
        self
    }
    pub const fn remote_sleep_ind_time(mut self, time: Duration) -> Self {
        self.inner.remote_sleep_ind_time = time;
        self
    }
    pub const fn nid_position(mut self, position: PduBytePosition) -> Self {
        self.inner.nid_position = position;
        self
    }
    pub const fn cbv_position(mut self, position: PduBytePosition) -> Self {
        self.inner.cbv_position = position;
        self
    }
    pub const fn pdu_length(mut self, len: usize) -> Self {
        self.inner.pdu_length = len;
        self
    }
    pub const fn rx_pdu_count(mut self, count: usize) -> Self {
        self.inner.rx_pdu_count = count;
        self
    }
    pub const fn user_data_pdu_id(mut self, pdu: PduId) -> Self {
        self.inner.user_data_pdu_id = Some(pdu);
        self
    }

    /// Validate the layout and produce the final configuration.
    pub fn build(self) -> Result<ChannelConfig, ConfigError> {
        let mut config = self.inner;

        if config.pdu_length == 0 || config.pdu_length > MAX_NM_PDU_BYTES {
            return Err(ConfigError::InvalidPduLength {
                len: config.pdu_length,
                max: MAX_NM_PDU_BYTES,
            });
        }
        if config.rx_pdu_count == 0 || config.rx_pdu_count > MAX_RX_PDU_HISTORY {
            return Err(ConfigError::InvalidRxHistory {
                count: config.rx_pdu_count,
                max: MAX_RX_PDU_HISTORY,
            });
        }

        let nid = config.nid_position.index();
        let cbv = config.cbv_position.index();
        match (nid, cbv) {
            (Some(a), Some(b)) if a == b => return Err(ConfigError::PositionOverlap),
            (Some(1), None) | (None, Some(1)) => return Err(ConfigError::PositionGap),
            _ => {}
        }
        for index in [nid, cbv].into_iter().flatten() {
            if index >= config.pdu_length {
                return Err(ConfigError::PositionOutOfFrame {
                    index,
                    len: config.pdu_length,
                });
            }
        }

        let offset = crate::infra::codec::cbv::user_data_offset(
            config.nid_position,
            config.cbv_position,
        );
        config.user_data = UserDataLayout {
            offset,
            len: crate::infra::codec::cbv::user_data_length(config.pdu_length, offset),
        };
        Ok(config)
    }
}

//==================================================================================GLOBAL_CONFIG
/// Switches shared by every channel of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NmGlobalConfig {
    /// The node never transmits NM PDUs.
    pub passive_mode: bool,
    /// Detect that every other node is ready to sleep.
    pub remote_sleep_ind_enabled: bool,
    /// Report every state change to the upper layer.
    pub state_change_ind_enabled: bool,
    /// Expose the user-data services.
    pub user_data_enabled: bool,
    /// User data is owned by an external router (set-user-data refused, frames forwarded).
    pub com_user_data_support: bool,
    /// Partial networking support.
    pub global_pn_support: bool,
    /// Send immediately when the network is requested again during prepare bus sleep.
    pub immediate_restart_enabled: bool,
    /// Gateway coordination (sleep-ready bit, coordinator indications).
    pub coordination_sync_support: bool,
    /// Notify the upper layer of every received NM PDU.
    pub pdu_rx_indication_enabled: bool,
    /// Elapsed time added by each call to the periodic driver.
    pub main_function_period: Duration,
}

impl Default for NmGlobalConfig {
    fn default() -> Self {
        Self {
            passive_mode: false,
            remote_sleep_ind_enabled: false,
            state_change_ind_enabled: false,
            user_data_enabled: false,
            com_user_data_support: false,
            global_pn_support: false,
            immediate_restart_enabled: false,
            coordination_sync_support: false,
            pdu_rx_indication_enabled: false,
            main_function_period: Duration::from_millis(10),
        }
    }
}

//==================================================================================NM_CONFIG
/// Complete configuration: global switches plus one entry per channel.
#[derive(Debug, Clone, Copy)]
pub struct NmConfig<const N: usize> {
    global: NmGlobalConfig,
    channels: [ChannelConfig; N],
}

impl<const N: usize> NmConfig<N> {
    /// Bundle and cross-check the channel table.
    pub fn new(global: NmGlobalConfig, channels: [ChannelConfig; N]) -> Result<Self, ConfigError> {
        if global.main_function_period == Duration::from_ticks(0) {
            return Err(ConfigError::ZeroMainFunctionPeriod);
        }
        for (i, channel) in channels.iter().enumerate() {
            for other in &channels[i + 1..] {
                if other.rx_pdu_id == channel.rx_pdu_id {
                    return Err(ConfigError::DuplicatePdu {
                        pdu: channel.rx_pdu_id,
                    });
                }
                if other.tx_pdu_id == channel.tx_pdu_id {
                    return Err(ConfigError::DuplicatePdu {
                        pdu: channel.tx_pdu_id,
                    });
                }
            }
        }
        Ok(Self { global, channels })
    }

    pub fn global(&self) -> &NmGlobalConfig {
        &self.global
    }

    pub fn channels(&self) -> &[ChannelConfig; N] {
        &self.channels
    }

    /// Configuration of one channel, `None` when out of range.
    pub fn channel(&self, channel: usize) -> Option<&ChannelConfig> {
        self.channels.get(channel)
    }
}
