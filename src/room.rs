// Copyright (c) 2019 heya developers
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! A named set of client sessions messages can be fanned out to.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::client::Client;

// Room ///////////////////////////////////////////////////////////////////////////////////////////

/// A named collection of [`Client`] sessions.
///
/// Rooms are handles: cloning is cheap and all clones address the same
/// member set. Membership is keyed by session id, so a client can join a
/// room at most once.
#[derive(Debug, Clone)]
pub struct Room {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    name: String,
    members: Mutex<Vec<Arc<Client>>>,
}

impl Room {
    pub(crate) fn new(name: &str) -> Self {
        Room {
            inner: Arc::new(Inner { name: name.to_string(), members: Mutex::new(Vec::new()) }),
        }
    }

    /// The room name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Add a client to the room. Adding a member twice is a no-op.
    pub fn add_client(&self, client: Arc<Client>) {
        let mut members = lock(&self.inner.members);
        if members.iter().all(|c| c.id() != client.id()) {
            members.push(client)
        }
    }

    /// Remove the client with the given session id. Returns `true` if it
    /// was a member.
    pub fn remove_client(&self, id: u64) -> bool {
        let mut members = lock(&self.inner.members);
        match members.iter().position(|c| c.id() == id) {
            Some(i) => {
                members.remove(i);
                true
            }
            None => false,
        }
    }

    /// Is the client with the given session id a member?
    pub fn contains(&self, id: u64) -> bool {
        lock(&self.inner.members).iter().any(|c| c.id() == id)
    }

    /// Number of members.
    pub fn client_count(&self) -> usize {
        lock(&self.inner.members).len()
    }

    /// A snapshot of the current members.
    ///
    /// Broadcast iterates over such a snapshot so that evicting a failed
    /// member does not disturb the traversal.
    pub fn clients(&self) -> Vec<Arc<Client>> {
        lock(&self.inner.members).clone()
    }
}

// A poisoned member list is still structurally sound; keep going.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// Tests //////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod test {
    use super::Room;
    use crate::client::Client;
    use std::net::{TcpListener, TcpStream};
    use std::sync::Arc;

    fn client() -> Arc<Client> {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let _peer = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        Arc::new(Client::new(server, 1024))
    }

    #[test]
    fn membership_is_a_set() {
        let room = Room::new("lobby");
        let c = client();
        room.add_client(c.clone());
        room.add_client(c.clone());
        assert_eq!(room.client_count(), 1);
        assert!(room.contains(c.id()))
    }

    #[test]
    fn remove_client() {
        let room = Room::new("lobby");
        let a = client();
        let b = client();
        room.add_client(a.clone());
        room.add_client(b.clone());
        assert!(room.remove_client(a.id()));
        assert!(!room.remove_client(a.id()));
        assert_eq!(room.client_count(), 1);
        assert!(room.contains(b.id()))
    }

    #[test]
    fn clones_share_members() {
        let room = Room::new("lobby");
        let other = room.clone();
        room.add_client(client());
        assert_eq!(other.client_count(), 1)
    }
}
