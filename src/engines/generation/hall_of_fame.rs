use crate::engines::generation::genome::Genome;
use crate::engines::generation::operators::{rank_order, Contender};
use crate::types::{Fingerprint, FitnessResult};

use std::collections::HashSet;

#[derive(Clone, Debug)]
pub struct Elite {
    pub genome: Genome,
    pub result: FitnessResult,
    pub generation: usize,
}

impl Elite {
    fn contender(&self) -> Contender {
        Contender {
            fitness: self.result.fitness,
            distance: self.genome.distance_from_base(),
        }
    }
}

/// Best distinct genomes seen across the whole run
pub struct HallOfFame {
    elites: Vec<Elite>,
    max_size: usize,
    seen_fingerprints: HashSet<Fingerprint>,
}

impl HallOfFame {
    pub fn new(max_size: usize) -> Self {
        Self {
            elites: Vec::new(),
            max_size,
            seen_fingerprints: HashSet::new(),
        }
    }

    /// Attempt to add a genome to the Hall of Fame
    pub fn try_add(&mut self, genome: &Genome, result: &FitnessResult, generation: usize) -> bool {
        if self.max_size == 0 {
            return false;
        }
        let fingerprint = genome.fingerprint();
        if self.seen_fingerprints.contains(&fingerprint) {
            return false; // Duplicate, reject
        }

        self.elites.push(Elite {
            genome: genome.clone(),
            result: result.clone(),
            generation,
        });
        self.seen_fingerprints.insert(fingerprint);
        self.sort_and_trim();

        self.seen_fingerprints.contains(&fingerprint)
    }

    /// Stable sort on the run-wide ranking order, then trim to max size
    fn sort_and_trim(&mut self) {
        let contenders: Vec<Contender> = self.elites.iter().map(Elite::contender).collect();
        let mut order: Vec<usize> = (0..self.elites.len()).collect();
        order.sort_by(|&a, &b| rank_order((a, &contenders[a]), (b, &contenders[b])));

        let mut sorted: Vec<Elite> = order.into_iter().map(|i| self.elites[i].clone()).collect();
        while sorted.len() > self.max_size {
            if let Some(removed) = sorted.pop() {
                self.seen_fingerprints.remove(&removed.genome.fingerprint());
            }
        }
        self.elites = sorted;
    }

    pub fn best(&self) -> Option<&Elite> {
        self.elites.first()
    }

    /// Get all elite genomes, best first
    pub fn get_all(&self) -> &[Elite] {
        &self.elites
    }

    pub fn len(&self) -> usize {
        self.elites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elites.is_empty()
    }
}
