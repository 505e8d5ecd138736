//! Migration sessions.
//!
//! A session owns the mutable state of one migration run: its direction, the
//! commands issued so far and the last existence check. Sessions are handed
//! out by a [`SessionSlot`], which admits one active session at a time.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::backend::MigrationBackend;
use crate::builder::{self, TableBlock};
use crate::command::{Command, ExistsTarget};
use crate::config::{MigratorConfig, PrimaryKeyConfig};
use crate::direction::Direction;
use crate::error::{MigrateError, Result};
use crate::schema::{Index, Table};

static GLOBAL_SLOT: SessionSlot = SessionSlot::new();

/// Identity of an active session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Session identifier, unique per slot.
    pub id: u64,
    /// Direction the session runs in.
    pub direction: Direction,
    /// When the session started.
    pub started_at: DateTime<Utc>,
}

/// Options applied to descriptors built during a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Prefix given to tables and indexes that do not name one.
    pub prefix: Option<String>,
    /// Implicit primary key for created tables.
    pub primary_key: PrimaryKeyConfig,
}

impl From<&MigratorConfig> for SessionOptions {
    fn from(config: &MigratorConfig) -> Self {
        Self {
            prefix: config.default_prefix.clone(),
            primary_key: config.primary_key.clone(),
        }
    }
}

/// Admits at most one active migration session.
#[derive(Debug)]
pub struct SessionSlot {
    active: Mutex<Option<SessionInfo>>,
    next_id: AtomicU64,
}

impl Default for SessionSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionSlot {
    /// Creates an empty slot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            active: parking_lot::const_mutex(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Returns the process-wide slot.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL_SLOT
    }

    /// Returns the active session, if any.
    #[must_use]
    pub fn active(&self) -> Option<SessionInfo> {
        self.active.lock().clone()
    }

    /// Starts a session with default options.
    pub fn start<'a>(
        &'a self,
        backend: &'a dyn MigrationBackend,
        direction: Direction,
    ) -> Result<Session<'a>> {
        self.start_with(backend, direction, SessionOptions::default())
    }

    /// Starts a session.
    ///
    /// Fails with [`MigrateError::AlreadyStarted`] while another session from
    /// this slot is active.
    pub fn start_with<'a>(
        &'a self,
        backend: &'a dyn MigrationBackend,
        direction: Direction,
        options: SessionOptions,
    ) -> Result<Session<'a>> {
        let mut active = self.active.lock();
        if let Some(current) = active.as_ref() {
            return Err(MigrateError::AlreadyStarted {
                session_id: current.id,
                direction: current.direction,
            });
        }

        let info = SessionInfo {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            direction,
            started_at: Utc::now(),
        };
        *active = Some(info.clone());
        drop(active);

        info!(session = info.id, direction = %direction, "Migration session started");

        Ok(Session {
            slot: self,
            backend,
            info,
            options,
            commands: Vec::new(),
            last_exists: None,
            released: false,
        })
    }

    fn release(&self, id: u64) {
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|current| current.id == id) {
            *active = None;
        }
    }
}

/// The context of one migration run.
///
/// Every DSL call builds a command, passes it through the session's
/// direction and records the result. In reverse mode an irreversible
/// statement fails immediately and nothing is recorded for it.
pub struct Session<'a> {
    slot: &'a SessionSlot,
    backend: &'a dyn MigrationBackend,
    info: SessionInfo,
    options: SessionOptions,
    commands: Vec<Command>,
    last_exists: Option<ExistsTarget>,
    released: bool,
}

impl std::fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("info", &self.info)
            .field("options", &self.options)
            .field("commands", &self.commands.len())
            .finish_non_exhaustive()
    }
}

impl Session<'_> {
    /// Returns the session identity.
    #[must_use]
    pub const fn info(&self) -> &SessionInfo {
        &self.info
    }

    /// Returns the direction of this session.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.info.direction
    }

    /// Returns the last recorded command.
    #[must_use]
    pub fn last_command(&self) -> Option<&Command> {
        self.commands.last()
    }

    /// Returns the descriptor of the last existence check.
    #[must_use]
    pub const fn last_exists(&self) -> Option<&ExistsTarget> {
        self.last_exists.as_ref()
    }

    /// Returns every command recorded so far, in emission order.
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Creates a table with the columns declared in `block`.
    pub fn create<F>(&mut self, table: Table, block: F) -> Result<()>
    where
        F: FnOnce(&mut TableBlock),
    {
        let table = self.prefixed_table(table);
        let command = builder::build_create_with(
            table,
            collect(block),
            self.backend,
            &self.options.primary_key,
        )?;
        self.record(command)
    }

    /// Creates a table unless it already exists.
    pub fn create_if_not_exists<F>(&mut self, table: Table, block: F) -> Result<()>
    where
        F: FnOnce(&mut TableBlock),
    {
        let table = self.prefixed_table(table);
        let command = builder::build_create_if_not_exists_with(
            table,
            collect(block),
            self.backend,
            &self.options.primary_key,
        )?;
        self.record(command)
    }

    /// Alters a table with the operations declared in `block`.
    pub fn alter<F>(&mut self, table: Table, block: F) -> Result<()>
    where
        F: FnOnce(&mut TableBlock),
    {
        let table = self.prefixed_table(table);
        let command = builder::build_alter(table, collect(block), self.backend)?;
        self.record(command)
    }

    /// Drops a table.
    pub fn drop(&mut self, table: Table) -> Result<()> {
        let command = builder::build_drop(self.prefixed_table(table))?;
        self.record(command)
    }

    /// Drops a table if it exists.
    pub fn drop_if_exists(&mut self, table: Table) -> Result<()> {
        let command = builder::build_drop_if_exists(self.prefixed_table(table))?;
        self.record(command)
    }

    /// Renames a table.
    pub fn rename_table(&mut self, from: Table, to: Table) -> Result<()> {
        let command =
            builder::build_rename_table(self.prefixed_table(from), self.prefixed_table(to))?;
        self.record(command)
    }

    /// Creates an index.
    pub fn create_index(&mut self, index: Index) -> Result<()> {
        let command = builder::build_create_index(self.prefixed_index(index))?;
        self.record(command)
    }

    /// Creates an index unless it already exists.
    pub fn create_index_if_not_exists(&mut self, index: Index) -> Result<()> {
        let command = builder::build_create_index_if_not_exists(self.prefixed_index(index))?;
        self.record(command)
    }

    /// Drops an index.
    pub fn drop_index(&mut self, index: Index) -> Result<()> {
        let command = builder::build_drop_index(self.prefixed_index(index))?;
        self.record(command)
    }

    /// Drops an index if it exists.
    pub fn drop_index_if_exists(&mut self, index: Index) -> Result<()> {
        let command = builder::build_drop_index_if_exists(self.prefixed_index(index))?;
        self.record(command)
    }

    /// Executes a raw statement. Not reversible.
    pub fn execute(&mut self, statement: impl Into<String>) -> Result<()> {
        self.record(Command::ExecuteRaw(statement.into()))
    }

    /// Executes `up` going forward and `down` going in reverse.
    pub fn execute_reversible(
        &mut self,
        up: impl Into<String>,
        down: impl Into<String>,
    ) -> Result<()> {
        let statement = match self.direction() {
            Direction::Forward => up.into(),
            Direction::Reverse => down.into(),
        };
        self.push(Command::ExecuteRaw(statement));
        Ok(())
    }

    /// Checks whether a table or index exists.
    ///
    /// In reverse the backend's answer is negated. The checkd descriptor is
    /// kept for [`Session::last_exists`] either way.
    pub fn exists(&mut self, target: impl Into<ExistsTarget>) -> Result<bool> {
        let target = match target.into() {
            ExistsTarget::Table(table) => ExistsTarget::Table(self.prefixed_table(table)),
            ExistsTarget::Index(index) => ExistsTarget::Index(self.prefixed_index(index)),
        };
        let exists = self.backend.exists(&target)?;
        let answer = self.direction().check(exists);
        debug!(
            session = self.info.id,
            target = ?target,
            exists,
            answer,
            "Checked existence"
        );
        self.last_exists = Some(target);
        Ok(answer)
    }

    /// Ends the session and returns the recorded commands in execution order.
    ///
    /// A reverse session undoes statements last to first, so its commands
    /// come back in the opposite order of emission.
    pub fn stop(mut self) -> Vec<Command> {
        let mut commands = std::mem::take(&mut self.commands);
        if self.direction() == Direction::Reverse {
            commands.reverse();
        }
        self.last_exists = None;
        self.release();
        info!(
            session = self.info.id,
            commands = commands.len(),
            "Migration session stopped"
        );
        commands
    }

    fn record(&mut self, command: Command) -> Result<()> {
        match self.direction().emit(command) {
            Ok(command) => {
                self.push(command);
                Ok(())
            }
            Err(err) => {
                warn!(session = self.info.id, error = %err, "Rejected migration command");
                Err(err)
            }
        }
    }

    fn push(&mut self, command: Command) {
        debug!(
            session = self.info.id,
            direction = %self.direction(),
            command = %command,
            "Recorded migration command"
        );
        self.commands.push(command);
    }

    fn prefixed_table(&self, mut table: Table) -> Table {
        if table.prefix.is_none() {
            table.prefix.clone_from(&self.options.prefix);
        }
        table
    }

    fn prefixed_index(&self, mut index: Index) -> Index {
        if index.prefix.is_none() {
            index.prefix.clone_from(&self.options.prefix);
        }
        index
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.slot.release(self.info.id);
        }
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if !self.released {
            debug!(session = self.info.id, "Migration session dropped without stop");
            self.release();
        }
    }
}

fn collect<F>(block: F) -> Vec<crate::command::ColumnOperation>
where
    F: FnOnce(&mut TableBlock),
{
    let mut table_block = TableBlock::new();
    block(&mut table_block);
    table_block.into_operations()
}
