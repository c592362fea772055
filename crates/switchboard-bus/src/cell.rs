// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use tokio::sync::watch;

/// Holds the current value of `T` and notifies observers on change.
#[derive(Debug)]
pub struct StateCell<T> {
    sender: watch::Sender<T>,
}

impl<T: Clone + Send + Sync + 'static> StateCell<T> {
    pub fn new(initial: T) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    /// Clone of the current value.
    pub fn get(&self) -> T {
        self.sender.borrow().clone()
    }

    /// Replace the value and notify observers.
    pub fn set(&self, value: T) {
        self.sender.send_replace(value);
    }

    /// Mutate in place; observers are notified only when `f` returns true.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut T) -> bool,
    {
        self.sender.send_if_modified(f)
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }
}

impl<T: PartialEq + Clone + Send + Sync + 'static> StateCell<T> {
    /// Set the value, notifying only if it actually changed.
    pub fn set_if_changed(&self, value: T) -> bool {
        self.sender.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }
}

impl<T: Default + Clone + Send + Sync + 'static> Default for StateCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_latest() {
        let cell = StateCell::new(1);
        cell.set(2);
        assert_eq!(cell.get(), 2);
    }

    #[tokio::test]
    async fn observers_are_notified_only_on_real_change() {
        let cell = StateCell::new("idle");
        let mut rx = cell.subscribe();

        assert!(!cell.set_if_changed("idle"));
        assert!(!rx.has_changed().unwrap());

        assert!(cell.set_if_changed("busy"));
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), "busy");
    }

    #[test]
    fn update_can_decline() {
        let cell = StateCell::new(vec![1, 2]);
        let mut rx = cell.subscribe();
        assert!(!cell.update(|v| v.is_empty()));
        assert!(!rx.has_changed().unwrap());
        assert!(cell.update(|v| {
            v.push(3);
            true
        }));
        assert!(rx.has_changed().unwrap());
        rx.mark_unchanged();
        assert_eq!(cell.get(), vec![1, 2, 3]);
    }
}
