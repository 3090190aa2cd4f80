use std::collections::HashMap;
use std::fmt;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Transport-assigned identifier of one connected party
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a random connection ID
    pub fn generate() -> Self {
        let id = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(20)
            .map(char::from)
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionRole {
    Unset,
    Teacher,
    Student { name: String },
}

#[derive(Debug, Clone)]
struct Connection {
    role: ConnectionRole,
    /// Connect order, used to pick the earliest holder of a duplicated name
    seq: u64,
}

/// Distinct student names in first-join order.
///
/// Names are not unique per connection: two students joining as "Sam"
/// share one entry, and either of them leaving removes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    names: Vec<String>,
}

impl Roster {
    /// Returns false if the name was already present
    pub fn insert(&mut self, name: &str) -> bool {
        if self.contains(name) {
            return false;
        }
        self.names.push(name.to_string());
        true
    }

    /// Returns false if the name was absent
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.names.len();
        self.names.retain(|n| n != name);
        self.names.len() != before
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.names.clone()
    }
}

/// Tracks live connections, their roles and the roster of joined students.
///
/// Pure state: broadcasting the roster is left to the session.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    roster: Roster,
    connections: HashMap<ConnectionId, Connection>,
    next_seq: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, connection_id: ConnectionId) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.connections.insert(
            connection_id,
            Connection {
                role: ConnectionRole::Unset,
                seq,
            },
        );
    }

    pub fn is_connected(&self, connection_id: &ConnectionId) -> bool {
        self.connections.contains_key(connection_id)
    }

    pub fn role(&self, connection_id: &ConnectionId) -> Option<&ConnectionRole> {
        self.connections.get(connection_id).map(|c| &c.role)
    }

    /// Name bound to a student connection
    pub fn student_name(&self, connection_id: &ConnectionId) -> Option<&str> {
        match self.role(connection_id) {
            Some(ConnectionRole::Student { name }) => Some(name),
            _ => None,
        }
    }

    /// Marks the connection as a teacher. Returns false if its role was already set.
    pub fn register_teacher(&mut self, connection_id: &ConnectionId) -> bool {
        self.assign_role(connection_id, ConnectionRole::Teacher)
    }

    /// Binds `name` to the connection and adds it to the roster.
    /// Returns false (and changes nothing) if the role was already set.
    pub fn register_student(&mut self, connection_id: &ConnectionId, name: &str) -> bool {
        let assigned = self.assign_role(
            connection_id,
            ConnectionRole::Student {
                name: name.to_string(),
            },
        );
        if assigned {
            self.roster.insert(name);
        }
        assigned
    }

    fn assign_role(&mut self, connection_id: &ConnectionId, role: ConnectionRole) -> bool {
        match self.connections.get_mut(connection_id) {
            Some(connection) if connection.role == ConnectionRole::Unset => {
                connection.role = role;
                true
            }
            _ => false,
        }
    }

    /// Removes `name` from the roster. Returns false if it was absent.
    pub fn remove_student(&mut self, name: &str) -> bool {
        self.roster.remove(name)
    }

    /// Forgets the connection, returning the role it held.
    pub fn disconnect(&mut self, connection_id: &ConnectionId) -> Option<ConnectionRole> {
        self.connections.remove(connection_id).map(|c| c.role)
    }

    /// Earliest live connection currently bound to `name`
    pub fn connection_for(&self, name: &str) -> Option<ConnectionId> {
        self.connections
            .iter()
            .filter(|(_, c)| matches!(&c.role, ConnectionRole::Student { name: n } if n == name))
            .min_by_key(|(_, c)| c.seq)
            .map(|(id, _)| id.clone())
    }

    /// Removes `name` from the roster and unbinds the connection holding it,
    /// so its eventual transport disconnect leaves the roster alone.
    pub fn kick(&mut self, name: &str) -> (bool, Option<ConnectionId>) {
        let removed = self.roster.remove(name);
        let target = self.connection_for(name);
        if let Some(id) = &target {
            self.connections.remove(id);
        }
        (removed, target)
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn roster_size(&self) -> usize {
        self.roster.len()
    }
}
