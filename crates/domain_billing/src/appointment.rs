//! Appointments used to bill ambulante care

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{AppointmentId, ClientId};

/// A scheduled visit with a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub client_id: ClientId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl Appointment {
    /// Length of the visit in whole minutes; inverted times count as zero
    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes().max(0)
    }

    /// Whether the visit starts inside `[from, to)`
    pub fn starts_within(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        self.start_time >= from && self.start_time < to
    }
}

/// Sums the minutes of every appointment starting inside `[from, to)`
pub fn total_minutes_within(appointments: &[Appointment], from: DateTime<Utc>, to: DateTime<Utc>) -> (usize, i64) {
    appointments
        .iter()
        .filter(|a| a.starts_within(from, to))
        .fold((0, 0), |(count, minutes), a| (count + 1, minutes + a.duration_minutes()))
}
