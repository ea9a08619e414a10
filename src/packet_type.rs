//! Downlink packet classes and helpers used across the scheduler.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

/// Kind of downlink handed to the JIT queue.
///
/// The class decides how the pre/post delays of an entry are derived and which collision policy
/// applies against entries already in the queue. Adding a class only requires appending it to
/// [`PacketType::ALL`] and handling it in the exhaustive matches of the timing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketType {
    /// Reply in one of the two receive windows that follow an uplink.
    ClassA,
    /// Ping-slot downlink aligned on the beacon period.
    ClassB,
    /// Downlink to an always-listening device, possibly requested "as soon as possible".
    ClassC,
    /// Network-wide timing beacon.
    Beacon,
}

impl PacketType {
    /// All classes, data first then beacon.
    pub const ALL: [PacketType; 4] = [
        PacketType::ClassA,
        PacketType::ClassB,
        PacketType::ClassC,
        PacketType::Beacon,
    ];

    /// Stable index for per-class arrays.
    pub const fn index(self) -> usize {
        match self {
            PacketType::ClassA => 0,
            PacketType::ClassB => 1,
            PacketType::ClassC => 2,
            PacketType::Beacon => 3,
        }
    }

    /// Whether this class is a beacon.
    pub const fn is_beacon(self) -> bool {
        matches!(self, PacketType::Beacon)
    }

    /// Whether timestamps of this class are checked against the maximum advance window.
    ///
    /// Class C times are either computed by the ASAP search or chosen freely by the network
    /// server, and beacons are placed by the gateway itself, so only A and B are bounded.
    pub const fn is_advance_bounded(self) -> bool {
        match self {
            PacketType::ClassA | PacketType::ClassB => true,
            PacketType::ClassC | PacketType::Beacon => false,
        }
    }

    /// Whether this class may approach a queued beacon closer than the beacon guard.
    pub const fn may_approach_beacon(self) -> bool {
        match self {
            PacketType::ClassA | PacketType::ClassC => true,
            PacketType::ClassB | PacketType::Beacon => false,
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PacketType::ClassA => "class_a",
            PacketType::ClassB => "class_b",
            PacketType::ClassC => "class_c",
            PacketType::Beacon => "beacon",
        };
        write!(f, "{label}")
    }
}

/// Helper structure wrapping a value per [`PacketType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PacketTypeTable<T> {
    values: Vec<T>,
}

impl<T> PacketTypeTable<T> {
    /// Build a table by executing a closure for each class, in [`PacketType::ALL`] order.
    pub fn from_fn(mut f: impl FnMut(PacketType) -> T) -> Self {
        let mut values = Vec::with_capacity(PacketType::ALL.len());
        for packet_type in PacketType::ALL {
            values.push(f(packet_type));
        }
        PacketTypeTable { values }
    }

    pub fn get(&self, packet_type: PacketType) -> &T {
        &self.values[packet_type.index()]
    }

    pub fn get_mut(&mut self, packet_type: PacketType) -> &mut T {
        &mut self.values[packet_type.index()]
    }

    /// Iterate `(class, value)` pairs in [`PacketType::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (PacketType, &T)> {
        PacketType::ALL.into_iter().zip(self.values.iter())
    }
}

impl<T> Index<PacketType> for PacketTypeTable<T> {
    type Output = T;

    fn index(&self, index: PacketType) -> &Self::Output {
        self.get(index)
    }
}

impl<T> IndexMut<PacketType> for PacketTypeTable<T> {
    fn index_mut(&mut self, index: PacketType) -> &mut Self::Output {
        self.get_mut(index)
    }
}
