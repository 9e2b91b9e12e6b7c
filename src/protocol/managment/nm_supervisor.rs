//! Asynchronous supervisor built on top of [`CanNm`].
//!
//! [`SharedCanNm`] puts the instance behind an `embassy_sync` blocking mutex so
//! that bus callbacks and application tasks can reach it. The supervisor then
//! keeps the periodic main function alive and optionally offers a command
//! handle (`NmHandle`) to queue requests from other tasks.
//!
//! Firmware decides whether it needs the handle by providing a pre-allocated
//! [`embassy_sync::channel::Channel`]. No allocation is performed by the
//! library and there is no dependency on a particular executor.
use core::cell::RefCell;

use embassy_sync::{
    blocking_mutex::{raw::RawMutex, Mutex},
    channel::{Channel, Sender, TrySendError},
};
use futures_util::{future::select, future::Either, pin_mut};

use crate::core::{NetworkHandle, PduId, MAX_NM_PDU_BYTES};
use crate::error::NmResult;
use crate::protocol::managment::can_nm::CanNm;
use crate::protocol::transport::traits::{
    nm_bus::NmBus, nm_delay::NmDelay, nm_upper_layer::NmUpperLayer,
};

//==================================================================================SHARED_INSTANCE
/// Instance shared between tasks and interrupt-driven bus callbacks.
pub struct SharedCanNm<'c, M: RawMutex, B: NmBus, U: NmUpperLayer, const N: usize> {
    inner: Mutex<M, RefCell<CanNm<'c, B, U, N>>>,
}

impl<'c, M, B, U, const N: usize> SharedCanNm<'c, M, B, U, N>
where
    M: RawMutex,
    B: NmBus,
    U: NmUpperLayer,
{
    pub fn new(nm: CanNm<'c, B, U, N>) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(nm)),
        }
    }

    /// Run `f` with exclusive access to the instance.
    pub fn lock<R>(&self, f: impl FnOnce(&mut CanNm<'c, B, U, N>) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }

    pub fn into_inner(self) -> CanNm<'c, B, U, N> {
        self.inner.into_inner().into_inner()
    }
}

//==================================================================================SERVICE
/// Service assembling the supervisor components.
pub struct NmService<'a, 'c, M, B, U, D, const N: usize, const CMD_CAP: usize>
where
    M: RawMutex,
    B: NmBus,
    U: NmUpperLayer,
    D: NmDelay,
{
    nm: &'a SharedCanNm<'c, M, B, U, N>,
    delay: D,
    command_channel: Option<&'a Channel<M, NmCommand, CMD_CAP>>,
}

impl<'a, 'c, M, B, U, D, const N: usize, const CMD_CAP: usize>
    NmService<'a, 'c, M, B, U, D, N, CMD_CAP>
where
    M: RawMutex,
    B: NmBus,
    U: NmUpperLayer,
    D: NmDelay,
{
    pub fn new(
        nm: &'a SharedCanNm<'c, M, B, U, N>,
        delay: D,
        command_channel: Option<&'a Channel<M, NmCommand, CMD_CAP>>,
    ) -> Self {
        Self {
            nm,
            delay,
            command_channel,
        }
    }

    /// Split into handle/runner components.
    pub fn into_parts(self) -> NmServiceParts<'a, 'c, M, B, U, D, N, CMD_CAP> {
        let handle = self.command_channel.map(|channel| NmHandle {
            sender: channel.sender(),
        });
        NmServiceParts {
            handle,
            runner: NmRunner {
                nm: self.nm,
                delay: self.delay,
                command_channel: self.command_channel,
            },
        }
    }
}

/// Bundle returned by [`NmService::into_parts`].
pub struct NmServiceParts<'a, 'c, M, B, U, D, const N: usize, const CMD_CAP: usize>
where
    M: RawMutex,
    B: NmBus,
    U: NmUpperLayer,
    D: NmDelay,
{
    pub handle: Option<NmHandle<'a, M, CMD_CAP>>,
    pub runner: NmRunner<'a, 'c, M, B, U, D, N, CMD_CAP>,
}

//==================================================================================RUNNER
/// Runner that drives the main function and executes queued commands.
pub struct NmRunner<'a, 'c, M, B, U, D, const N: usize, const CMD_CAP: usize>
where
    M: RawMutex,
    B: NmBus,
    U: NmUpperLayer,
    D: NmDelay,
{
    nm: &'a SharedCanNm<'c, M, B, U, N>,
    delay: D,
    command_channel: Option<&'a Channel<M, NmCommand, CMD_CAP>>,
}

impl<'a, 'c, M, B, U, D, const N: usize, const CMD_CAP: usize>
    NmRunner<'a, 'c, M, B, U, D, N, CMD_CAP>
where
    M: RawMutex,
    B: NmBus,
    U: NmUpperLayer,
    D: NmDelay,
{
    /// Never returns. Commands arriving between two ticks do not shift the period.
    pub async fn drive(mut self) {
        let nm = self.nm;
        let period = nm.lock(|nm| nm.config().global().main_function_period);
        let delay = &mut self.delay;

        match self.command_channel {
            Some(commands) => loop {
                let tick = delay.delay(period);
                pin_mut!(tick);
                loop {
                    let command = commands.receive();
                    pin_mut!(command);
                    match select(tick.as_mut(), command).await {
                        Either::Left(((), _pending_command)) => break,
                        Either::Right((command, _)) => run_command(nm, command),
                    }
                }
                nm.lock(|nm| nm.main_function());
            },
            None => loop {
                delay.delay(period).await;
                nm.lock(|nm| nm.main_function());
            },
        }
    }
}

fn run_command<M, B, U, const N: usize>(nm: &SharedCanNm<'_, M, B, U, N>, command: NmCommand)
where
    M: RawMutex,
    B: NmBus,
    U: NmUpperLayer,
{
    if let Err(_err) = handle_command(nm, command) {
        #[cfg(feature = "defmt")]
        defmt::warn!(
            "NM command {} refused: {}",
            command,
            defmt::Debug2Format(&_err)
        );
    }
}

fn handle_command<M, B, U, const N: usize>(
    nm: &SharedCanNm<'_, M, B, U, N>,
    command: NmCommand,
) -> NmResult<(), B::Error>
where
    M: RawMutex,
    B: NmBus,
    U: NmUpperLayer,
{
    nm.lock(|nm| match command {
        NmCommand::NetworkRequest { channel } => nm.network_request(channel),
        NmCommand::NetworkRelease { channel } => nm.network_release(channel),
        NmCommand::PassiveStartUp { channel } => nm.passive_start_up(channel),
        NmCommand::RepeatMessageRequest { channel } => nm.repeat_message_request(channel),
        NmCommand::DisableCommunication { channel } => nm.disable_communication(channel),
        NmCommand::EnableCommunication { channel } => nm.enable_communication(channel),
        NmCommand::RequestBusSynchronization { channel } => {
            nm.request_bus_synchronization(channel)
        }
        NmCommand::SetSleepReadyBit { channel, ready } => nm.set_sleep_ready_bit(channel, ready),
        NmCommand::RxIndication { pdu, len, data } => {
            nm.rx_indication(pdu, &data[..len.min(MAX_NM_PDU_BYTES)])
        }
        NmCommand::TxConfirmation { pdu, success } => nm.tx_confirmation(pdu, success),
    })
}

//==================================================================================HANDLE
/// Commands queued by producer tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NmCommand {
    NetworkRequest {
        channel: NetworkHandle,
    },
    NetworkRelease {
        channel: NetworkHandle,
    },
    PassiveStartUp {
        channel: NetworkHandle,
    },
    RepeatMessageRequest {
        channel: NetworkHandle,
    },
    DisableCommunication {
        channel: NetworkHandle,
    },
    EnableCommunication {
        channel: NetworkHandle,
    },
    RequestBusSynchronization {
        channel: NetworkHandle,
    },
    SetSleepReadyBit {
        channel: NetworkHandle,
        ready: bool,
    },
    RxIndication {
        pdu: PduId,
        len: usize,
        data: [u8; MAX_NM_PDU_BYTES],
    },
    TxConfirmation {
        pdu: PduId,
        success: bool,
    },
}

impl NmCommand {
    /// Received PDU queued from an interrupt handler. Truncated to [`MAX_NM_PDU_BYTES`].
    pub fn rx_indication(pdu: PduId, payload: &[u8]) -> Self {
        let len = payload.len().min(MAX_NM_PDU_BYTES);
        let mut data = [0u8; MAX_NM_PDU_BYTES];
        data[..len].copy_from_slice(&payload[..len]);
        NmCommand::RxIndication { pdu, len, data }
    }
}

/// Command handle (optional).
pub struct NmHandle<'a, M: RawMutex, const CMD_CAP: usize> {
    sender: Sender<'a, M, NmCommand, CMD_CAP>,
}

impl<'a, M: RawMutex, const CMD_CAP: usize> NmHandle<'a, M, CMD_CAP> {
    /// Queue a command, waiting for room in the channel.
    pub async fn send(&self, command: NmCommand) {
        self.sender.send(command).await;
    }

    /// Queue a command without waiting. Usable from interrupt context.
    pub fn try_send(&self, command: NmCommand) -> Result<(), TrySendError<NmCommand>> {
        self.sender.try_send(command)
    }

    pub async fn network_request(&self, channel: NetworkHandle) {
        self.send(NmCommand::NetworkRequest { channel }).await;
    }

    pub async fn network_release(&self, channel: NetworkHandle) {
        self.send(NmCommand::NetworkRelease { channel }).await;
    }

    pub async fn passive_start_up(&self, channel: NetworkHandle) {
        self.send(NmCommand::PassiveStartUp { channel }).await;
    }

    pub async fn repeat_message_request(&self, channel: NetworkHandle) {
        self.send(NmCommand::RepeatMessageRequest { channel }).await;
    }

    pub async fn rx_indication(&self, pdu: PduId, payload: &[u8]) {
        self.send(NmCommand::rx_indication(pdu, payload)).await;
    }

    pub async fn tx_confirmation(&self, pdu: PduId, success: bool) {
        self.send(NmCommand::TxConfirmation { pdu, success }).await;
    }
}
