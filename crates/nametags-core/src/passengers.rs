//! Passenger memory: what the server last told clients about each owner's
//! passengers, so the synthetic display can be merged in without dropping
//! real riders (and dropped again without dropping them either).

use dashmap::DashMap;
use nametags_proto::packets::SetPassengers;

#[derive(Default)]
pub struct PassengerRegistry {
    /// vehicle entity id → real passenger ids, in server order.
    real: DashMap<i32, Vec<i32>>,
}

impl PassengerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the real passengers of `vehicle_id`, ignoring ids for which
    /// `is_synthetic` holds.
    pub fn record(
        &self,
        vehicle_id: i32,
        passengers: &[i32],
        is_synthetic: impl Fn(i32) -> bool,
    ) {
        let real: Vec<i32> = passengers
            .iter()
            .copied()
            .filter(|id| !is_synthetic(*id))
            .collect();
        if real.is_empty() {
            self.real.remove(&vehicle_id);
        } else {
            self.real.insert(vehicle_id, real);
        }
    }

    pub fn real_passengers(&self, vehicle_id: i32) -> Vec<i32> {
        self.real
            .get(&vehicle_id)
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    /// Real passengers plus the display, for attaching.
    pub fn attach_packet(&self, vehicle_id: i32, display_id: i32) -> SetPassengers {
        let mut pkt = SetPassengers {
            vehicle_id,
            passenger_ids: self.real_passengers(vehicle_id),
        };
        pkt.add_passenger(display_id);
        pkt
    }

    /// Real passengers only, for detaching the display.
    pub fn detach_packet(&self, vehicle_id: i32) -> SetPassengers {
        SetPassengers {
            vehicle_id,
            passenger_ids: self.real_passengers(vehicle_id),
        }
    }

    pub fn forget(&self, vehicle_id: i32) {
        self.real.remove(&vehicle_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic(id: i32) -> bool {
        id >= 1000
    }

    #[test]
    fn attach_merges_real_riders() {
        let reg = PassengerRegistry::new();
        reg.record(7, &[20, 21], synthetic);
        let pkt = reg.attach_packet(7, 5000);
        assert_eq!(pkt.vehicle_id, 7);
        assert_eq!(pkt.passenger_ids, vec![20, 21, 5000]);
        assert_eq!(reg.detach_packet(7).passenger_ids, vec![20, 21]);
    }

    #[test]
    fn synthetic_ids_are_not_remembered() {
        let reg = PassengerRegistry::new();
        reg.record(7, &[5000, 22], synthetic);
        assert_eq!(reg.real_passengers(7), vec![22]);
        reg.record(7, &[5000], synthetic);
        assert!(reg.real_passengers(7).is_empty());
    }

    #[test]
    fn unknown_vehicle_attaches_display_only() {
        let reg = PassengerRegistry::new();
        assert_eq!(reg.attach_packet(3, 4000).passenger_ids, vec![4000]);
        assert!(reg.detach_packet(3).passenger_ids.is_empty());
    }

    #[test]
    fn forget_clears_memory() {
        let reg = PassengerRegistry::new();
        reg.record(9, &[1], synthetic);
        reg.forget(9);
        assert!(reg.real_passengers(9).is_empty());
    }
}
