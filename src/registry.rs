//! Receivers and the handsets paired with them.
//!
//! The first handset registered with a receiver belongs to the teacher,
//! every later one to a student. That role is stored on the [`Remote`] when
//! it is created instead of being re-derived from list position.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

/// Whose hands a remote is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum Role {
    Teacher,
    Student,
}

/// A handset paired with a receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remote {
    /// Handset id as the receiver reports it.
    pub remote_id: String,
    /// May be empty, see [`Remote::display_name`].
    pub remote_name: String,
    /// Fixed when the remote is added.
    pub role: Role,
}

impl Remote {
    /// Whether this is the teacher's remote.
    pub fn is_teacher(&self) -> bool {
        self.role == Role::Teacher
    }

    /// The name to show, falling back to a placeholder for unnamed remotes.
    pub fn display_name(&self) -> &str {
        if self.remote_name.is_empty() {
            "Unnamed Remote"
        } else {
            &self.remote_name
        }
    }
}

/// A USB receiver and the handsets registered with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receiver {
    /// Unique, assigned on creation.
    pub receiver_id: String,
    /// What the user called it.
    pub receiver_name: String,
    /// Registration order, never re-sorted.
    pub remotes: Vec<Remote>,
}

impl Receiver {
    /// The remote with this handset id.
    pub fn find_remote(&self, remote_id: &str) -> Option<&Remote> {
        self.remotes.iter().find(|r| r.remote_id == remote_id)
    }

    /// The teacher's remote, if there still is one.
    pub fn teacher(&self) -> Option<&Remote> {
        self.remotes.iter().find(|r| r.is_teacher())
    }

    /// Every student remote, in registration order.
    pub fn students(&self) -> impl Iterator<Item = &Remote> {
        self.remotes.iter().filter(|r| !r.is_teacher())
    }

    /// "Teacher Remote" or "Student Remote N", N counting students from 1.
    pub fn role_label(&self, remote_id: &str) -> Option<String> {
        let remote = self.find_remote(remote_id)?;
        if remote.is_teacher() {
            return Some("Teacher Remote".to_owned());
        }
        let n = self.students().position(|r| r.remote_id == remote_id)? + 1;
        Some(format!("Student Remote {}", n))
    }

    /// Appends a remote unless its id is already known. A receiver without a
    /// teacher gets one from the first remote appended.
    fn push_remote(&mut self, remote_id: &str, remote_name: String) -> bool {
        if self.find_remote(remote_id).is_some() {
            return false;
        }
        let role = if self.teacher().is_none() {
            Role::Teacher
        } else {
            Role::Student
        };
        self.remotes.push(Remote {
            remote_id: remote_id.to_owned(),
            remote_name,
            role,
        });
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum RegistryError {
    UnknownReceiver(String),
    UnknownRemote(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::UnknownReceiver(id) => write!(f, "no receiver with id {}", id),
            RegistryError::UnknownRemote(id) => write!(f, "no remote with id {}", id),
        }
    }
}

impl std::error::Error for RegistryError {}

/// What [`Registry::commit`] did with a registration session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// This many new remotes were added.
    Added(usize),
    /// Every discovered remote was registered already.
    AllAlreadyAdded,
    /// No remote was pressed.
    NothingDiscovered,
}

/// Every receiver known to this workstation, plus which one is selected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    receivers: Vec<Receiver>,
    current_receiver: Option<String>,
}

impl Registry {
    /// A registry without receivers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every receiver, in creation order.
    pub fn receivers(&self) -> &[Receiver] {
        &self.receivers
    }

    /// The receiver with this id.
    pub fn find_by_receiver(&self, receiver_id: &str) -> Option<&Receiver> {
        self.receivers.iter().find(|r| r.receiver_id == receiver_id)
    }

    /// A remote registered with the given receiver.
    pub fn find_remote(&self, receiver_id: &str, remote_id: &str) -> Option<&Remote> {
        self.find_by_receiver(receiver_id)?.find_remote(remote_id)
    }

    fn receiver_mut(&mut self, receiver_id: &str) -> Result<&mut Receiver, RegistryError> {
        self.receivers
            .iter_mut()
            .find(|r| r.receiver_id == receiver_id)
            .ok_or_else(|| RegistryError::UnknownReceiver(receiver_id.to_owned()))
    }

    /// Creates and selects a new receiver. The id comes from the creation
    /// time, bumped if two receivers are created within one millisecond.
    pub fn create_receiver(&mut self, name: &str) -> &Receiver {
        let mut millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        while self.find_by_receiver(&millis.to_string()).is_some() {
            millis += 1;
        }
        let name = name.trim();
        let receiver = Receiver {
            receiver_id: millis.to_string(),
            receiver_name: if name.is_empty() {
                "Unnamed Receiver".to_owned()
            } else {
                name.to_owned()
            },
            remotes: Vec::new(),
        };
        info!(
            "Created receiver {} ({})",
            receiver.receiver_name, receiver.receiver_id
        );
        self.current_receiver = Some(receiver.receiver_id.clone());
        self.receivers.push(receiver);
        &self.receivers[self.receivers.len() - 1]
    }

    /// Renames a receiver. Blank names leave the old name in place.
    pub fn rename_receiver(&mut self, receiver_id: &str, name: &str) -> Result<(), RegistryError> {
        let name = name.trim();
        let receiver = self.receiver_mut(receiver_id)?;
        if !name.is_empty() {
            receiver.receiver_name = name.to_owned();
        }
        Ok(())
    }

    /// Renames a remote. Blank names leave the old name in place.
    pub fn rename_remote(
        &mut self,
        receiver_id: &str,
        remote_id: &str,
        name: &str,
    ) -> Result<(), RegistryError> {
        let name = name.trim();
        let remote = self
            .receiver_mut(receiver_id)?
            .remotes
            .iter_mut()
            .find(|r| r.remote_id == remote_id)
            .ok_or_else(|| RegistryError::UnknownRemote(remote_id.to_owned()))?;
        if !name.is_empty() {
            remote.remote_name = name.to_owned();
        }
        Ok(())
    }

    /// Removes a remote. Roles of the remaining remotes are left alone.
    pub fn delete_remote(&mut self, receiver_id: &str, remote_id: &str) -> Result<Remote, RegistryError> {
        let receiver = self.receiver_mut(receiver_id)?;
        let idx = receiver
            .remotes
            .iter()
            .position(|r| r.remote_id == remote_id)
            .ok_or_else(|| RegistryError::UnknownRemote(remote_id.to_owned()))?;
        Ok(receiver.remotes.remove(idx))
    }

    /// Makes a receiver the current one.
    pub fn select(&mut self, receiver_id: &str) -> Result<(), RegistryError> {
        self.receiver_mut(receiver_id)?;
        self.current_receiver = Some(receiver_id.to_owned());
        Ok(())
    }

    /// The selected receiver.
    pub fn current(&self) -> Option<&Receiver> {
        self.find_by_receiver(self.current_receiver.as_deref()?)
    }

    /// The receiver named by `receiver_id`, or the current one.
    pub fn resolve(&self, receiver_id: Option<&str>) -> Result<&Receiver, RegistryError> {
        match receiver_id {
            Some(id) => self
                .find_by_receiver(id)
                .ok_or_else(|| RegistryError::UnknownReceiver(id.to_owned())),
            None => self
                .current()
                .ok_or_else(|| RegistryError::UnknownReceiver("(none selected)".to_owned())),
        }
    }

    /// Adds the remotes discovered during registration that the receiver
    /// does not know yet. Blank names become "Remote N", N counting the
    /// remotes added by this call.
    pub fn commit(
        &mut self,
        receiver_id: &str,
        session: &RegistrationSession,
    ) -> Result<CommitOutcome, RegistryError> {
        let receiver = self.receiver_mut(receiver_id)?;
        if session.discovered().is_empty() {
            return Ok(CommitOutcome::NothingDiscovered);
        }

        let mut added = 0;
        for remote in session.discovered() {
            let name = if remote.remote_name.trim().is_empty() {
                format!("Remote {}", added + 1)
            } else {
                remote.remote_name.trim().to_owned()
            };
            if receiver.push_remote(&remote.remote_id, name) {
                added += 1;
            }
        }

        if added == 0 {
            Ok(CommitOutcome::AllAlreadyAdded)
        } else {
            info!("Added {} remotes to receiver {}", added, receiver_id);
            Ok(CommitOutcome::Added(added))
        }
    }
}

/// A handset seen during registration, not yet part of a receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct Discovered {
    pub remote_id: String,
    pub remote_name: String,
}

/// Collects handset ids while the user presses buttons on every remote in
/// turn. Seeing the same id twice is a no-op.
#[derive(Debug, Default)]
pub struct RegistrationSession {
    seen: HashSet<String>,
    discovered: Vec<Discovered>,
}

impl RegistrationSession {
    /// A session that has seen nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a handset. Returns `true` the first time an id is seen.
    pub fn observe(&mut self, remote_id: &str) -> bool {
        if !self.seen.insert(remote_id.to_owned()) {
            return false;
        }
        debug!("Discovered remote {}", remote_id);
        self.discovered.push(Discovered {
            remote_id: remote_id.to_owned(),
            remote_name: String::new(),
        });
        true
    }

    /// Names a discovered handset. Returns `false` for ids not seen.
    pub fn name(&mut self, remote_id: &str, name: &str) -> bool {
        match self.discovered.iter_mut().find(|d| d.remote_id == remote_id) {
            Some(d) => {
                d.remote_name = name.trim().to_owned();
                true
            }
            None => false,
        }
    }

    /// Handsets in the order they were first seen.
    pub fn discovered(&self) -> &[Discovered] {
        &self.discovered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(ids: &[&str]) -> (Registry, String) {
        let mut reg = Registry::new();
        let rid = reg.create_receiver("Room 101").receiver_id.clone();
        let mut session = RegistrationSession::new();
        for id in ids {
            session.observe(id);
        }
        reg.commit(&rid, &session).unwrap();
        (reg, rid)
    }

    #[test]
    fn first_remote_is_teacher() {
        let (reg, rid) = registry_with(&["T", "S1", "S2"]);
        let rcv = reg.find_by_receiver(&rid).unwrap();
        let roles: Vec<Role> = rcv.remotes.iter().map(|r| r.role).collect();
        assert_eq!(roles, vec![Role::Teacher, Role::Student, Role::Student]);
        assert_eq!(rcv.teacher().unwrap().remote_id, "T");
        assert_eq!(rcv.role_label("S2").as_deref(), Some("Student Remote 2"));
        assert_eq!(rcv.role_label("T").as_deref(), Some("Teacher Remote"));
    }

    #[test]
    fn duplicate_ids_register_once() {
        let mut session = RegistrationSession::new();
        assert!(session.observe("AA"));
        assert!(!session.observe("AA"));
        assert!(session.observe("BB"));
        assert_eq!(session.discovered().len(), 2);
    }

    #[test]
    fn default_names_and_repeat_commit() {
        let (mut reg, rid) = registry_with(&["T", "S1"]);
        let names: Vec<&str> = reg
            .find_by_receiver(&rid)
            .unwrap()
            .remotes
            .iter()
            .map(|r| r.remote_name.as_str())
            .collect();
        assert_eq!(names, vec!["Remote 1", "Remote 2"]);

        let mut again = RegistrationSession::new();
        again.observe("S1");
        assert_eq!(reg.commit(&rid, &again), Ok(CommitOutcome::AllAlreadyAdded));

        again.observe("S3");
        again.name("S3", "  Ada ");
        assert_eq!(reg.commit(&rid, &again), Ok(CommitOutcome::Added(1)));
        assert_eq!(reg.find_remote(&rid, "S3").unwrap().remote_name, "Ada");
        assert_eq!(reg.find_remote(&rid, "S3").unwrap().role, Role::Student);

        let empty = RegistrationSession::new();
        assert_eq!(reg.commit(&rid, &empty), Ok(CommitOutcome::NothingDiscovered));
    }

    #[test]
    fn rename_and_delete() {
        let (mut reg, rid) = registry_with(&["T", "S1"]);
        reg.rename_remote(&rid, "S1", " Grace ").unwrap();
        assert_eq!(reg.find_remote(&rid, "S1").unwrap().remote_name, "Grace");
        reg.rename_remote(&rid, "S1", "   ").unwrap();
        assert_eq!(reg.find_remote(&rid, "S1").unwrap().remote_name, "Grace");
        assert_eq!(
            reg.rename_remote(&rid, "nope", "x"),
            Err(RegistryError::UnknownRemote("nope".to_owned()))
        );

        let removed = reg.delete_remote(&rid, "T").unwrap();
        assert!(removed.is_teacher());
        // The remaining student stays a student.
        assert_eq!(reg.find_remote(&rid, "S1").unwrap().role, Role::Student);
        assert!(reg.find_by_receiver(&rid).unwrap().teacher().is_none());
    }

    #[test]
    fn receivers_get_unique_ids_and_selection() {
        let mut reg = Registry::new();
        let a = reg.create_receiver("").receiver_id.clone();
        let b = reg.create_receiver("B").receiver_id.clone();
        assert_ne!(a, b);
        assert_eq!(reg.find_by_receiver(&a).unwrap().receiver_name, "Unnamed Receiver");
        assert_eq!(reg.current().unwrap().receiver_id, b);
        reg.select(&a).unwrap();
        assert_eq!(reg.current().unwrap().receiver_id, a);
        assert!(reg.select("missing").is_err());
        reg.rename_receiver(&a, "Lab").unwrap();
        assert_eq!(reg.find_by_receiver(&a).unwrap().receiver_name, "Lab");
    }

    #[test]
    fn resolve_falls_back_to_current() {
        let (mut reg, rid) = registry_with(&["T"]);
        assert_eq!(reg.resolve(None).unwrap().receiver_id, rid);
        assert_eq!(reg.resolve(Some(&rid)).unwrap().receiver_id, rid);
        assert!(matches!(reg.resolve(Some("nope")), Err(RegistryError::UnknownReceiver(_))));

        reg.current_receiver = None;
        assert!(reg.resolve(None).is_err());
    }
}
