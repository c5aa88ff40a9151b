/// A fixed list of row identifiers replayed in order, wrapping at the end.
///
/// Benchmarks pick the parameter for iteration `i` with [`IdCycle::id_at`],
/// so the same run always issues the same sequence of ids.
#[derive(Debug, Clone)]
pub struct IdCycle {
    ids: Vec<i32>,
}

impl IdCycle {
    /// Creates a cycle over `ids`. The list must not be empty.
    pub fn new(ids: Vec<i32>) -> Self {
        assert!(!ids.is_empty(), "id list must not be empty");
        IdCycle { ids }
    }

    /// The id used by iteration `iteration`.
    pub fn id_at(&self, iteration: usize) -> i32 {
        self.ids[iteration % self.ids.len()]
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[i32] {
        &self.ids
    }
}

#[cfg(test)]
mod tests {
    use super::IdCycle;
    use std::collections::HashMap;

    #[test]
    #[should_panic(expected = "id list must not be empty")]
    fn new_panics_on_empty_list() {
        let _ = IdCycle::new(Vec::new());
    }

    #[test]
    fn id_at_wraps_modulo_length() {
        let cycle = IdCycle::new(vec![7, 3, 9]);
        assert_eq!(cycle.id_at(0), 7);
        assert_eq!(cycle.id_at(2), 9);
        assert_eq!(cycle.id_at(3), 7);
        assert_eq!(cycle.id_at(3001), 3);
    }

    #[test]
    fn replay_follows_the_given_order() {
        let cycle = IdCycle::new(vec![4, 8, 15, 16, 23, 42]);
        let replayed: Vec<i32> = (0..cycle.len()).map(|i| cycle.id_at(i)).collect();
        assert_eq!(replayed, cycle.ids());
        assert!(!cycle.is_empty());
    }

    #[test]
    fn every_id_is_used_at_least_floor_m_over_n_times() {
        let ids: Vec<i32> = (1..=7).collect();
        let cycle = IdCycle::new(ids.clone());

        for iterations in [0usize, 1, 6, 7, 8, 50, 699, 700] {
            let mut uses: HashMap<i32, usize> = HashMap::new();
            for i in 0..iterations {
                *uses.entry(cycle.id_at(i)).or_default() += 1;
            }
            let floor = iterations / ids.len();
            for id in &ids {
                let count = uses.get(id).copied().unwrap_or(0);
                assert!(count >= floor, "id {id} used {count} times, expected >= {floor}");
                assert!(count <= floor + 1);
            }
        }
    }
}
