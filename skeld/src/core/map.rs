//! Static ship layout: rooms, the corridor graph, the vent graph and the task pool.
//!
//! Layouts are described by a serializable [`MapSpec`] (undirected edge lists, so
//! both graphs are symmetric by construction) and compiled into an indexed
//! [`ShipMap`]. Room ids are indices in declaration order, which is also the
//! order neighbors are enumerated in.

use std::collections::{BTreeSet, HashMap};

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

pub type RoomId = usize;

/// Room declaration inside a [`MapSpec`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSpec {
    pub name: String,
    /// Emergency button location.
    #[serde(default)]
    pub button: bool,
    /// Security monitor location (VIEW MONITOR).
    #[serde(default)]
    pub cameras: bool,
    /// Visible through the security monitor.
    #[serde(default)]
    pub monitored: bool,
}

/// Serializable map description (the `[map]` config section).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapSpec {
    pub rooms: Vec<RoomSpec>,
    /// Undirected walking connections.
    pub corridors: Vec<[String; 2]>,
    /// Undirected vent connections (Impostors only).
    #[serde(default)]
    pub vents: Vec<[String; 2]>,
}

/// Task kind; decides how many COMPLETE TASK turns a task needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Common,
    Short,
    Long,
}

impl TaskKind {
    pub fn steps(self) -> u32 {
        match self {
            TaskKind::Common | TaskKind::Short => 1,
            TaskKind::Long => 2,
        }
    }
}

/// Task pool entry (the `[[tasks]]` config section).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    pub room: String,
    pub kind: TaskKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Room {
    pub name: String,
    pub adjacent: BTreeSet<RoomId>,
    pub vents: BTreeSet<RoomId>,
    pub has_button: bool,
    pub has_cameras: bool,
    pub monitored: bool,
}

/// Compiled, immutable ship layout shared by every player of a game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipMap {
    rooms: Vec<Room>,
    button_room: RoomId,
}

impl ShipMap {
    /// Compile a map description, rejecting unknown rooms, self-loops and
    /// layouts without an emergency button.
    pub fn from_spec(spec: &MapSpec) -> Result<Self> {
        let mut index: HashMap<&str, RoomId> = HashMap::new();
        let mut rooms = Vec::with_capacity(spec.rooms.len());
        for (id, room) in spec.rooms.iter().enumerate() {
            if room.name.trim().is_empty() {
                bail!("map room {} has an empty name", id);
            }
            if index.insert(room.name.as_str(), id).is_some() {
                bail!("duplicate map room '{}'", room.name);
            }
            rooms.push(Room {
                name: room.name.clone(),
                adjacent: BTreeSet::new(),
                vents: BTreeSet::new(),
                has_button: room.button,
                has_cameras: room.cameras,
                monitored: room.monitored,
            });
        }

        let lookup = |name: &str| -> Result<RoomId> {
            match index.get(name) {
                Some(id) => Ok(*id),
                None => bail!("map edge references unknown room '{}'", name),
            }
        };

        for [a, b] in &spec.corridors {
            let (a, b) = (lookup(a)?, lookup(b)?);
            if a == b {
                bail!("corridor from '{}' to itself", rooms[a].name);
            }
            rooms[a].adjacent.insert(b);
            rooms[b].adjacent.insert(a);
        }
        for [a, b] in &spec.vents {
            let (a, b) = (lookup(a)?, lookup(b)?);
            if a == b {
                bail!("vent from '{}' to itself", rooms[a].name);
            }
            rooms[a].vents.insert(b);
            rooms[b].vents.insert(a);
        }

        let button_room = match rooms.iter().position(|room| room.has_button) {
            Some(id) => id,
            None => bail!("map must contain a room with the emergency button"),
        };
        if rooms.iter().filter(|room| room.has_button).count() > 1 {
            bail!("map must contain exactly one emergency button");
        }

        Ok(Self { rooms, button_room })
    }

    /// The default layout.
    pub fn skeld() -> Self {
        Self::from_spec(&MapSpec::skeld()).expect("built-in skeld layout is valid")
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn room(&self, id: RoomId) -> &Room {
        &self.rooms[id]
    }

    pub fn name(&self, id: RoomId) -> &str {
        &self.rooms[id].name
    }

    pub fn find(&self, name: &str) -> Option<RoomId> {
        self.rooms
            .iter()
            .position(|room| room.name.eq_ignore_ascii_case(name))
    }

    pub fn movement_neighbors(&self, id: RoomId) -> &BTreeSet<RoomId> {
        &self.rooms[id].adjacent
    }

    /// Raw vent adjacency; role gating happens in the world model.
    pub fn vent_graph(&self, id: RoomId) -> &BTreeSet<RoomId> {
        &self.rooms[id].vents
    }

    pub fn button_room(&self) -> RoomId {
        self.button_room
    }

    pub fn monitored_rooms(&self) -> impl Iterator<Item = RoomId> + '_ {
        self.rooms
            .iter()
            .enumerate()
            .filter(|(_, room)| room.monitored)
            .map(|(id, _)| id)
    }
}

impl MapSpec {
    /// The Skeld layout.
    pub fn skeld() -> Self {
        let room = |name: &str, button: bool, cameras: bool, monitored: bool| RoomSpec {
            name: name.to_string(),
            button,
            cameras,
            monitored,
        };
        let edges = |pairs: &[(&str, &str)]| -> Vec<[String; 2]> {
            pairs
                .iter()
                .map(|(a, b)| [a.to_string(), b.to_string()])
                .collect()
        };

        Self {
            rooms: vec![
                room("Cafeteria", true, false, false),
                room("Weapons", false, false, false),
                room("Navigation", false, false, true),
                room("O2", false, false, false),
                room("Shields", false, false, false),
                room("Communications", false, false, false),
                room("Storage", false, false, false),
                room("Admin", false, false, true),
                room("Electrical", false, false, false),
                room("Lower Engine", false, false, false),
                room("Security", false, true, false),
                room("Reactor", false, false, false),
                room("Upper Engine", false, false, true),
                room("Medbay", false, false, true),
            ],
            corridors: edges(&[
                ("Cafeteria", "Weapons"),
                ("Cafeteria", "Admin"),
                ("Cafeteria", "Upper Engine"),
                ("Cafeteria", "Medbay"),
                ("Weapons", "Navigation"),
                ("Weapons", "O2"),
                ("Navigation", "Shields"),
                ("O2", "Shields"),
                ("O2", "Admin"),
                ("Shields", "Communications"),
                ("Shields", "Storage"),
                ("Communications", "Storage"),
                ("Storage", "Admin"),
                ("Storage", "Electrical"),
                ("Storage", "Lower Engine"),
                ("Admin", "Electrical"),
                ("Electrical", "Lower Engine"),
                ("Lower Engine", "Security"),
                ("Lower Engine", "Reactor"),
                ("Lower Engine", "Upper Engine"),
                ("Security", "Reactor"),
                ("Security", "Upper Engine"),
                ("Reactor", "Upper Engine"),
                ("Upper Engine", "Medbay"),
            ]),
            vents: edges(&[
                ("Cafeteria", "Admin"),
                ("Weapons", "Navigation"),
                ("Navigation", "Shields"),
                ("Electrical", "Security"),
                ("Electrical", "Medbay"),
                ("Security", "Medbay"),
                ("Reactor", "Upper Engine"),
                ("Reactor", "Lower Engine"),
            ]),
        }
    }
}

/// Task pool matching [`MapSpec::skeld`].
pub fn skeld_tasks() -> Vec<TaskSpec> {
    let task = |name: &str, room: &str, kind: TaskKind| TaskSpec {
        name: name.to_string(),
        room: room.to_string(),
        kind,
    };
    vec![
        task("Fix Wiring", "Electrical", TaskKind::Common),
        task("Swipe Card", "Admin", TaskKind::Common),
        task("Empty Garbage", "Cafeteria", TaskKind::Short),
        task("Calibrate Distributor", "Electrical", TaskKind::Short),
        task("Chart Course", "Navigation", TaskKind::Short),
        task("Clean O2 Filter", "O2", TaskKind::Short),
        task("Prime Shields", "Shields", TaskKind::Short),
        task("Stabilize Steering", "Navigation", TaskKind::Short),
        task("Unlock Manifolds", "Reactor", TaskKind::Short),
        task("Destroy Asteroids", "Weapons", TaskKind::Short),
        task("Align Engine Output", "Upper Engine", TaskKind::Long),
        task("Fuel Engines", "Lower Engine", TaskKind::Long),
        task("Inspect Sample", "Medbay", TaskKind::Long),
        task("Start Reactor", "Reactor", TaskKind::Long),
        task("Upload Data", "Communications", TaskKind::Long),
        task("Clear Asteroids", "Weapons", TaskKind::Long),
    ]
}
