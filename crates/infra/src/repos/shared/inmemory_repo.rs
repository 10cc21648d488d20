use chime_scheduler_domain::{Entity, ID};
use std::sync::{Mutex, MutexGuard};

/// Useful functions for creating inmemory repositories

fn lock<T>(collection: &Mutex<Vec<T>>) -> MutexGuard<'_, Vec<T>> {
    collection.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn insert<T: Clone>(val: &T, collection: &Mutex<Vec<T>>) {
    lock(collection).push(val.clone());
}

pub fn find<T: Clone + Entity>(val_id: &ID, collection: &Mutex<Vec<T>>) -> Option<T> {
    lock(collection).iter().find(|v| v.id() == val_id).cloned()
}

pub fn find_by<T: Clone, F: FnMut(&T) -> bool>(collection: &Mutex<Vec<T>>, mut compare: F) -> Vec<T> {
    lock(collection)
        .iter()
        .filter(|item| compare(item))
        .cloned()
        .collect()
}

pub fn delete<T: Clone + Entity>(val_id: &ID, collection: &Mutex<Vec<T>>) -> Option<T> {
    let mut collection = lock(collection);
    let index = collection.iter().position(|v| v.id() == val_id)?;
    Some(collection.remove(index))
}

/// Atomic read-modify-write of a single value. The stored value is only
/// replaced when `update` succeeds. Returns `None` if there is no value
/// with the given id.
pub fn update_with<T, E, F>(val_id: &ID, collection: &Mutex<Vec<T>>, update: F) -> Option<Result<T, E>>
where
    T: Clone + Entity,
    F: FnOnce(&mut T) -> Result<(), E>,
{
    let mut collection = lock(collection);
    let stored = collection.iter_mut().find(|v| v.id() == val_id)?;
    let mut updated = stored.clone();
    Some(update(&mut updated).map(|_| {
        *stored = updated.clone();
        updated
    }))
}
