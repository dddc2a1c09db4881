//! Drives a whole session through the dispatcher with a simulated Bluefruit peripheral.

use std::time::Duration;
use futures::StreamExt;
use futures::channel::mpsc::unbounded;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use bluefruit_counter::counter::Counter;
use bluefruit_counter::device::constants::{make_uart_rx_uuid, PERIPHERAL_NAME};
use bluefruit_counter::device::dispatcher::channel;
use bluefruit_counter::device::machine::ConnectionStateMachine;
use bluefruit_counter::device::simulated::{uart_services, LinkRequest, SimulatedDevice, SimulatedRadioLink, SIMULATED_PERIPHERAL};
use bluefruit_counter::device::sink::Registration;
use bluefruit_counter::device::types::{AppEvent, LinkEvent, LinkPhase, LinkStatus};

#[tokio::test]
async fn simulated_peripheral_counts() {
    let cancel = CancellationToken::new();
    let (sender, queue) = channel::<SimulatedDevice>();
    let payloads = vec![b"1".to_vec(), b"2".to_vec(), b"2".to_vec()];
    let (link, log) = SimulatedRadioLink::responsive(sender.clone(), payloads, Duration::ZERO, cancel.clone());
    let dispatcher = tokio::spawn(queue.run(ConnectionStateMachine::new(link), cancel.clone()));

    let (events_tx, mut events_rx) = unbounded();
    let registration = sender.register(Box::new(move |event: AppEvent| {
        events_tx.unbounded_send(event).unwrap();
    })).await.unwrap();
    assert_eq!(registration, Registration::Registered);

    sender.start_scan();

    let mut counter = Counter::new();
    let mut received = vec![];
    for _ in 0..3 {
        let event = timeout(Duration::from_secs(5), events_rx.next()).await.unwrap().unwrap();
        counter.apply(event);
        received.push(event);
    }
    assert_eq!(received, vec![AppEvent::Reset, AppEvent::CountUp, AppEvent::CountUp]);
    assert_eq!(counter.count(), 2);

    sender.shutdown();
    let machine = dispatcher.await.unwrap();

    assert_eq!(machine.phase(), LinkPhase::Ready);
    assert!(!machine.is_scanning());
    assert_eq!(log.requests(), vec![
        LinkRequest::StartScan,
        LinkRequest::Connect(SIMULATED_PERIPHERAL),
        LinkRequest::StopScan,
        LinkRequest::DiscoverServices(SIMULATED_PERIPHERAL),
        LinkRequest::EnableNotification(SIMULATED_PERIPHERAL, make_uart_rx_uuid()),
    ]);
}

#[tokio::test]
async fn callbacks_from_many_threads_are_serialized() {
    let (link, log) = SimulatedRadioLink::passive();
    let (sender, queue) = channel::<SimulatedDevice>();

    let (events_tx, mut events_rx) = unbounded();
    let mut machine = ConnectionStateMachine::new(link);
    let registration = machine.register_observer(Box::new(move |event: AppEvent| {
        events_tx.unbounded_send(event).unwrap();
    }));
    assert_eq!(registration, Registration::Registered);

    sender.start_scan();
    sender.post(LinkEvent::Advertisement { device: SimulatedDevice(3), name: PERIPHERAL_NAME.to_string() });
    sender.post(LinkEvent::Connected { device: SimulatedDevice(3) });
    sender.post(LinkEvent::ServicesDiscovered {
        device: SimulatedDevice(3),
        status: LinkStatus::Success,
        services: uart_services(),
    });

    // platform callbacks arriving concurrently from other threads
    let threads: Vec<_> = (0..4)
        .map(|_| {
            let sender = sender.clone();
            std::thread::spawn(move || {
                for _ in 0..25 {
                    sender.post(LinkEvent::Notification {
                        device: SimulatedDevice(3),
                        characteristic: make_uart_rx_uuid(),
                        value: b"2".to_vec(),
                    });
                }
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }
    drop(sender);

    let machine = queue.run(machine, CancellationToken::new()).await;
    assert_eq!(machine.phase(), LinkPhase::SubscribingNotify);
    assert_eq!(log.count(|request| matches!(request, LinkRequest::Connect(_))), 1);
    // the observer, and with it the event sender, goes away with the machine
    drop(machine);

    let mut counter = Counter::new();
    let mut delivered = 0;
    while let Some(event) = events_rx.next().await {
        counter.apply(event);
        delivered += 1;
    }
    assert_eq!(delivered, 100);
    assert_eq!(counter.count(), 100);
}

#[tokio::test]
async fn reconnect_delivers_each_notification_once() {
    let cancel = CancellationToken::new();
    let (sender, queue) = channel::<SimulatedDevice>();
    let payloads = vec![b"2".to_vec(); 3];
    let (link, log) = SimulatedRadioLink::responsive(sender.clone(), payloads, Duration::from_millis(100), cancel.clone());
    let dispatcher = tokio::spawn(queue.run(ConnectionStateMachine::new(link), cancel.clone()));

    let (events_tx, mut events_rx) = unbounded();
    let registration = sender.register(Box::new(move |event: AppEvent| {
        events_tx.unbounded_send(event).unwrap();
    })).await.unwrap();
    assert_eq!(registration, Registration::Registered);

    sender.start_scan();
    let first = timeout(Duration::from_secs(5), events_rx.next()).await.unwrap().unwrap();
    assert_eq!(first, AppEvent::CountUp);

    // the peripheral drops out after its first notification and is found again
    sender.post(LinkEvent::Disconnected { device: SIMULATED_PERIPHERAL });
    sender.start_scan();

    let mut counter = Counter::new();
    for _ in 0..3 {
        let event = timeout(Duration::from_secs(5), events_rx.next()).await.unwrap().unwrap();
        counter.apply(event);
    }
    assert_eq!(counter.count(), 3);
    assert!(timeout(Duration::from_millis(500), events_rx.next()).await.is_err());

    sender.shutdown();
    let machine = dispatcher.await.unwrap();
    cancel.cancel();

    assert_eq!(machine.phase(), LinkPhase::Ready);
    assert_eq!(log.count(|request| matches!(request, LinkRequest::Connect(_))), 2);
    assert_eq!(log.count(|request| *request == LinkRequest::Release(SIMULATED_PERIPHERAL)), 1);
}
