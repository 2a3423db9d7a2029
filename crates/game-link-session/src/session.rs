//! Game session
//!
//! The session is the single object every proxy ultimately talks to. It is
//! deliberately not thread-safe: it lives on the worker thread and is only
//! touched by tasks running there.

use game_link_core::Result;
use game_link_dispatch::Signal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Planet identifier
pub type PlanetId = u32;

/// Kinds of cargo a planet stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CargoKind {
    Neutronium,
    Tritanium,
    Supplies,
    Money,
}

impl CargoKind {
    pub const ALL: [CargoKind; 4] = [Self::Neutronium, Self::Tritanium, Self::Supplies, Self::Money];

    pub fn name(self) -> &'static str {
        match self {
            Self::Neutronium => "neutronium",
            Self::Tritanium => "tritanium",
            Self::Supplies => "supplies",
            Self::Money => "money",
        }
    }
}

impl fmt::Display for CargoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Cargo stored on one planet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CargoHold {
    pub neutronium: i64,
    pub tritanium: i64,
    pub supplies: i64,
    pub money: i64,
}

impl CargoHold {
    pub fn get(&self, kind: CargoKind) -> i64 {
        match kind {
            CargoKind::Neutronium => self.neutronium,
            CargoKind::Tritanium => self.tritanium,
            CargoKind::Supplies => self.supplies,
            CargoKind::Money => self.money,
        }
    }

    pub fn get_mut(&mut self, kind: CargoKind) -> &mut i64 {
        match kind {
            CargoKind::Neutronium => &mut self.neutronium,
            CargoKind::Tritanium => &mut self.tritanium,
            CargoKind::Supplies => &mut self.supplies,
            CargoKind::Money => &mut self.money,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Planet {
    pub id: PlanetId,
    pub name: String,
    #[serde(default)]
    pub cargo: CargoHold,
}

impl Planet {
    pub fn new(id: PlanetId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            cargo: CargoHold::default(),
        }
    }
}

/// Rule violations reported back to the caller in a status reply
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CargoError {
    #[error("Unknown planet {0}")]
    UnknownPlanet(PlanetId),

    #[error("Not enough {kind}: requested {requested}, available {available}")]
    Insufficient {
        kind: CargoKind,
        requested: i64,
        available: i64,
    },

    #[error("Cannot store {amount} more {kind}: {stored} already stored")]
    Overflow { kind: CargoKind, amount: i64, stored: i64 },

    #[error("Source and destination are the same planet")]
    SamePlanet,

    #[error("Transfer amount must not be negative: {0}")]
    NegativeAmount(i64),
}

/// The game state owned by the worker thread
#[derive(Default)]
pub struct Session {
    turn: u32,
    planets: BTreeMap<PlanetId, Planet>,

    /// Raised with the planet id after every change to a planet
    pub sig_planet_change: Signal<PlanetId>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Small fixed universe used by the demo binary and tests
    pub fn demo() -> Self {
        let mut session = Self::new();
        for (id, name, neutronium, supplies, money) in [
            (1, "Organia", 120, 40, 500),
            (2, "Vulcan", 15, 210, 80),
            (3, "Cestus", 0, 0, 0),
        ] {
            let mut planet = Planet::new(id, name);
            planet.cargo.neutronium = neutronium;
            planet.cargo.supplies = supplies;
            planet.cargo.money = money;
            session.add_planet(planet);
        }
        session
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn advance_turn(&mut self) -> u32 {
        self.turn += 1;
        debug!("Session advanced to turn {}", self.turn);
        self.turn
    }

    /// Insert or replace a planet
    pub fn add_planet(&mut self, planet: Planet) {
        let id = planet.id;
        self.planets.insert(id, planet);
        self.sig_planet_change.raise(&id);
    }

    pub fn planet(&self, id: PlanetId) -> Option<&Planet> {
        self.planets.get(&id)
    }

    pub fn planets(&self) -> impl Iterator<Item = &Planet> {
        self.planets.values()
    }

    /// Load (`amount > 0`) or unload (`amount < 0`) cargo on a planet.
    /// Returns the new amount stored.
    pub fn add_cargo(&mut self, id: PlanetId, kind: CargoKind, amount: i64) -> std::result::Result<i64, CargoError> {
        let planet = self.planets.get_mut(&id).ok_or(CargoError::UnknownPlanet(id))?;
        let slot = planet.cargo.get_mut(kind);
        let Some(stored) = slot.checked_add(amount) else {
            return Err(CargoError::Overflow {
                kind,
                amount,
                stored: *slot,
            });
        };
        if stored < 0 {
            return Err(CargoError::Insufficient {
                kind,
                requested: amount.saturating_neg(),
                available: *slot,
            });
        }
        *slot = stored;
        self.sig_planet_change.raise(&id);
        Ok(stored)
    }

    /// Move cargo between two planets. Both planets change or neither does.
    pub fn transfer(
        &mut self,
        from: PlanetId,
        to: PlanetId,
        kind: CargoKind,
        amount: i64,
    ) -> std::result::Result<(), CargoError> {
        if amount < 0 {
            return Err(CargoError::NegativeAmount(amount));
        }
        if from == to {
            return Err(CargoError::SamePlanet);
        }
        let stored = self.planet(to).ok_or(CargoError::UnknownPlanet(to))?.cargo.get(kind);
        if stored.checked_add(amount).is_none() {
            return Err(CargoError::Overflow { kind, amount, stored });
        }
        // The destination is known to accept the amount, so only the source
        // can still refuse, before anything has changed
        self.add_cargo(from, kind, -amount)?;
        self.add_cargo(to, kind, amount)?;
        Ok(())
    }

    /// Hash of all planet state, for determinism checks
    pub fn state_hash(&self) -> Result<String> {
        let json = serde_json::to_string(&self.planets)?;
        Ok(hex::encode(Sha256::digest(json.as_bytes())))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("turn", &self.turn)
            .field("planets", &self.planets.len())
            .finish()
    }
}
