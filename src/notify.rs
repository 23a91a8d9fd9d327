use tokio::sync::broadcast;

const CAPACITY: usize = 64;

/// Fan-out of change events to any number of subscribers.
///
/// Emitting without subscribers is not an error, events are simply dropped.
#[derive(Debug)]
pub(crate) struct Notifier<E> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone> Notifier<E> {
    pub(crate) fn new() -> Self {
        let (sender, _) = broadcast::channel(CAPACITY);
        Notifier { sender }
    }

    pub(crate) fn emit(&self, event: E) {
        let _ = self.sender.send(event);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }
}

/// Stores `value` into `field` and emits `event(value)` if it differs. Returns whether it changed.
pub(crate) fn update_field<T, E, F>(field: &mut T, value: T, notifier: &Notifier<E>, event: F) -> bool
where
    T: PartialEq + Clone,
    E: Clone,
    F: FnOnce(T) -> E,
{
    if *field == value {
        return false;
    }
    *field = value.clone();
    notifier.emit(event(value));
    true
}

#[cfg(test)]
pub(crate) fn drain<E: Clone>(receiver: &mut broadcast::Receiver<E>) -> Vec<E> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}
