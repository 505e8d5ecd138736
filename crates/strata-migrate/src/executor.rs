//! Migration executor.
//!
//! Runs migrations through sessions and keeps the resulting schema state and
//! the set of applied versions.

use std::collections::{BTreeSet, HashSet};

use tracing::{info, warn};

use crate::command::Command;
use crate::config::MigratorConfig;
use crate::direction::Direction;
use crate::error::{MigrateError, Result};
use crate::session::{SessionOptions, SessionSlot};
use crate::state::SchemaState;
use crate::Migration;

/// What one migration run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationReport {
    /// Migration version.
    pub version: i64,
    /// Migration name.
    pub name: String,
    /// Direction the migration ran in.
    pub direction: Direction,
    /// Commands recorded, in execution order.
    pub commands: Vec<Command>,
}

/// Runs migrations forward or in reverse.
#[derive(Debug)]
pub struct Migrator<'s> {
    slot: &'s SessionSlot,
    config: MigratorConfig,
    state: SchemaState,
    applied: BTreeSet<i64>,
}

impl Migrator<'static> {
    /// Creates a migrator using the process-wide session slot.
    #[must_use]
    pub fn new(config: MigratorConfig) -> Self {
        Self::with_slot(SessionSlot::global(), config)
    }
}

impl<'s> Migrator<'s> {
    /// Creates a migrator using the given session slot.
    #[must_use]
    pub fn with_slot(slot: &'s SessionSlot, config: MigratorConfig) -> Self {
        Self {
            slot,
            config,
            state: SchemaState::new(),
            applied: BTreeSet::new(),
        }
    }

    /// Starts from an existing schema state.
    #[must_use]
    pub fn with_state(mut self, state: SchemaState) -> Self {
        self.state = state;
        self
    }

    /// Returns the schema state after the runs so far.
    #[must_use]
    pub const fn state(&self) -> &SchemaState {
        &self.state
    }

    /// Returns the applied versions.
    #[must_use]
    pub const fn applied(&self) -> &BTreeSet<i64> {
        &self.applied
    }

    /// Checks if a version has been applied.
    #[must_use]
    pub fn is_applied(&self, version: i64) -> bool {
        self.applied.contains(&version)
    }

    /// Runs a single migration.
    ///
    /// Going forward the migration's `up` runs in a forward session. Going in
    /// reverse an explicit `down` runs in a forward session; otherwise
    /// `change` runs in a reverse session and every statement is inverted.
    pub fn run(
        &mut self,
        migration: &dyn Migration,
        direction: Direction,
    ) -> Result<MigrationReport> {
        info!(
            version = migration.version(),
            name = migration.name(),
            direction = %direction,
            "Running migration"
        );

        let explicit_down = direction == Direction::Reverse && migration.has_down();
        let session_direction = if explicit_down {
            Direction::Forward
        } else {
            direction
        };

        let mut session = self.slot.start_with(
            &self.state,
            session_direction,
            SessionOptions::from(&self.config),
        )?;
        let outcome = match direction {
            Direction::Forward => migration.up(&mut session),
            Direction::Reverse if explicit_down => migration.down(&mut session),
            Direction::Reverse => migration.change(&mut session),
        };
        let commands = session.stop();
        outcome?;

        self.state.apply_all(&commands)?;
        match direction {
            Direction::Forward => self.applied.insert(migration.version()),
            Direction::Reverse => self.applied.remove(&migration.version()),
        };

        info!(
            version = migration.version(),
            name = migration.name(),
            commands = commands.len(),
            "Migration finished"
        );

        Ok(MigrationReport {
            version: migration.version(),
            name: migration.name().to_string(),
            direction,
            commands,
        })
    }

    /// Runs every migration that still needs to run in `direction`.
    ///
    /// Forward runs pending migrations in ascending version order; reverse
    /// runs applied migrations in descending order.
    pub fn run_all(
        &mut self,
        migrations: &[&dyn Migration],
        direction: Direction,
    ) -> Result<Vec<MigrationReport>> {
        let mut ordered = sorted(migrations)?;
        if direction == Direction::Reverse {
            ordered.reverse();
        }

        let mut reports = Vec::new();
        for migration in ordered {
            let applied = self.is_applied(migration.version());
            match direction {
                Direction::Forward if applied => {
                    warn!(
                        version = migration.version(),
                        name = migration.name(),
                        "Migration already applied, skipping"
                    );
                }
                Direction::Reverse if !applied => {
                    warn!(
                        version = migration.version(),
                        name = migration.name(),
                        "Migration not applied, skipping rollback"
                    );
                }
                _ => reports.push(self.run(migration, direction)?),
            }
        }
        Ok(reports)
    }

    /// Returns the migrations not applied yet, in version order.
    pub fn pending<'m>(&self, migrations: &[&'m dyn Migration]) -> Result<Vec<&'m dyn Migration>> {
        Ok(sorted(migrations)?
            .into_iter()
            .filter(|m| !self.is_applied(m.version()))
            .collect())
    }
}

fn sorted<'m>(migrations: &[&'m dyn Migration]) -> Result<Vec<&'m dyn Migration>> {
    let mut seen = HashSet::with_capacity(migrations.len());
    for migration in migrations {
        if !seen.insert(migration.version()) {
            return Err(MigrateError::DuplicateVersion(migration.version()));
        }
    }
    let mut ordered = migrations.to_vec();
    ordered.sort_by_key(|m| m.version());
    Ok(ordered)
}
