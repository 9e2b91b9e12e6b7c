//! Supervisor tests: periodic driving, queued commands and refused requests.
mod helpers {
    include!("../../helpers/mod.rs");
}

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::Channel;
use helpers::{channel_builder, config, global, Event, MockBus, MockDelay, MockUpper, RX_PDU};
use korri_cannm::core::NmState;
use korri_cannm::protocol::managment::can_nm::CanNm;
use korri_cannm::protocol::managment::nm_supervisor::{NmCommand, NmService, SharedCanNm};
use static_cell::StaticCell;
use tokio::time::{sleep, Duration};

static REQUEST_COMMANDS: StaticCell<Channel<NoopRawMutex, NmCommand, 4>> = StaticCell::new();
static REFUSED_COMMANDS: StaticCell<Channel<NoopRawMutex, NmCommand, 4>> = StaticCell::new();
static RX_COMMANDS: StaticCell<Channel<NoopRawMutex, NmCommand, 4>> = StaticCell::new();

#[tokio::test]
async fn supervisor_executes_network_request() {
    let commands = REQUEST_COMMANDS.init(Channel::new());
    let config = config(global(), channel_builder());
    let bus = MockBus::new();
    let mut nm = CanNm::new(&config, bus.clone(), MockUpper::new());
    nm.init();
    let shared = SharedCanNm::<NoopRawMutex, _, _, 1>::new(nm);

    let parts = NmService::new(&shared, MockDelay, Some(&*commands)).into_parts();
    let handle = parts
        .handle
        .expect("handle must exist when command channel is provided");
    let runner_future = parts.runner.drive();

    tokio::select! {
        _ = runner_future => {
            panic!("supervisor ended unexpectedly");
        }
        _ = async {
            handle.network_request(0).await;
            sleep(Duration::from_millis(120)).await;

            let state = shared.lock(|nm| nm.get_state(0).unwrap().0);
            assert_eq!(state, NmState::RepeatMessage);
            assert!(bus.sent() >= 1, "the message cycle must run under the supervisor");
        } => {}
    }
}

#[tokio::test]
async fn supervisor_survives_refused_commands() {
    let commands = REFUSED_COMMANDS.init(Channel::new());
    let config = config(global(), channel_builder());
    let mut nm = CanNm::new(&config, MockBus::new(), MockUpper::new());
    nm.init();
    let shared = SharedCanNm::<NoopRawMutex, _, _, 1>::new(nm);

    let parts = NmService::new(&shared, MockDelay, Some(&*commands)).into_parts();
    let handle = parts
        .handle
        .expect("handle must exist when command channel is provided");
    let runner_future = parts.runner.drive();

    tokio::select! {
        _ = runner_future => {
            panic!("supervisor ended unexpectedly");
        }
        _ = async {
            // Repeat message is refused in bus sleep; the next request still runs.
            handle.repeat_message_request(0).await;
            handle.send(NmCommand::NetworkRelease { channel: 7 }).await;
            handle.network_request(0).await;
            sleep(Duration::from_millis(50)).await;

            let state = shared.lock(|nm| nm.get_state(0).unwrap().0);
            assert_eq!(state, NmState::RepeatMessage);
        } => {}
    }
}

#[tokio::test]
async fn supervisor_forwards_received_pdus() {
    let commands = RX_COMMANDS.init(Channel::new());
    let config = config(global(), channel_builder());
    let upper = MockUpper::new();
    let mut nm = CanNm::new(&config, MockBus::new(), upper.clone());
    nm.init();
    let shared = SharedCanNm::<NoopRawMutex, _, _, 1>::new(nm);

    let parts = NmService::new(&shared, MockDelay, Some(&*commands)).into_parts();
    let handle = parts
        .handle
        .expect("handle must exist when command channel is provided");
    let runner_future = parts.runner.drive();

    tokio::select! {
        _ = runner_future => {
            panic!("supervisor ended unexpectedly");
        }
        _ = async {
            // Queued without waiting, as a receive interrupt would do.
            handle
                .try_send(NmCommand::rx_indication(RX_PDU, &[0x33, 0x00, 1, 2, 3, 4, 5, 6]))
                .expect("command channel has room");
            sleep(Duration::from_millis(30)).await;
            assert_eq!(upper.count(Event::NetworkStart(0)), 1);
            assert_eq!(shared.lock(|nm| nm.get_node_identifier(0).unwrap()), 0x33);

            handle.passive_start_up(0).await;
            sleep(Duration::from_millis(30)).await;
            assert_eq!(
                shared.lock(|nm| nm.get_state(0).unwrap().0),
                NmState::RepeatMessage
            );
        } => {}
    }
}

#[tokio::test]
async fn supervisor_without_commands_reaches_bus_sleep() {
    let config = config(global(), channel_builder());
    let upper = MockUpper::new();
    let mut nm = CanNm::new(&config, MockBus::new(), upper.clone());
    nm.init();
    nm.passive_start_up(0).unwrap();
    let shared = SharedCanNm::<NoopRawMutex, _, _, 1>::new(nm);

    let parts = NmService::<_, _, _, _, 1, 1>::new(&shared, MockDelay, None).into_parts();
    assert!(parts.handle.is_none());
    let runner_future = parts.runner.drive();

    tokio::select! {
        _ = runner_future => {
            panic!("supervisor ended unexpectedly");
        }
        _ = sleep(Duration::from_millis(1500)) => {}
    }

    let nm = shared.into_inner();
    assert_eq!(nm.get_state(0).unwrap().0, NmState::BusSleep);
    assert_eq!(upper.count(Event::BusSleep(0)), 1);
}
