//! Thread-local activity slot.
//!
//! A 128-bit activity identifier travels with the logical work item running
//! on the current thread. Every event built while the slot holds a non-nil
//! value is stamped with it. The nil GUID means "cleared".

use std::cell::Cell;
use uuid::Uuid;

thread_local! {
    static ACTIVITY_SLOT: Cell<Uuid> = const { Cell::new(Uuid::nil()) };
}

/// Sets the current thread's activity identifier.
pub fn set(id: Uuid) {
    ACTIVITY_SLOT.with(|slot| slot.set(id));
}

/// Clears the current thread's activity identifier.
pub fn clear() {
    ACTIVITY_SLOT.with(|slot| slot.set(Uuid::nil()));
}

/// Reads the current thread's activity identifier; nil when cleared.
pub fn get() -> Uuid {
    ACTIVITY_SLOT.with(|slot| slot.get())
}

/// Generates a fresh random identifier, installs it and returns it.
pub fn new_random() -> Uuid {
    let id = Uuid::new_v4();
    set(id);
    id
}

/// Exchanges the caller's value with the slot, returning the previous value.
pub fn swap(id: Uuid) -> Uuid {
    ACTIVITY_SLOT.with(|slot| slot.replace(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_starts_cleared() {
        std::thread::spawn(|| {
            assert!(get().is_nil());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_set_get_clear() {
        std::thread::spawn(|| {
            let id = Uuid::new_v4();
            set(id);
            assert_eq!(get(), id);
            clear();
            assert!(get().is_nil());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_swap_returns_previous() {
        std::thread::spawn(|| {
            let first = Uuid::new_v4();
            let second = Uuid::new_v4();
            set(first);
            let previous = swap(second);
            assert_eq!(previous, first);
            assert_eq!(get(), second);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_new_random_installs() {
        std::thread::spawn(|| {
            let id = new_random();
            assert!(!id.is_nil());
            assert_eq!(get(), id);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_slot_is_per_thread() {
        std::thread::spawn(|| {
            set(Uuid::new_v4());
            let inner = std::thread::spawn(|| get()).join().unwrap();
            assert!(inner.is_nil());
        })
        .join()
        .unwrap();
    }
}
