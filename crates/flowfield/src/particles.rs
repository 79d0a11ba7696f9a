// Particle population advected through a viewport cache

use crate::cache::ViewportFieldCache;
use crate::config::{EngineConfig, HolePolicy};
use crate::palette::IntensityRamp;
use glam::Vec2;
use rand::Rng;

/// Screen-space particle. `target` is set only while a drawable segment is pending.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Particle {
    pub x: f32,
    pub y: f32,
    pub age: f32,
    pub target: Option<Vec2>,
}

impl Particle {
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// Line segment from a particle's current to its pending position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub from: Vec2,
    pub to: Vec2,
}

/// What a single tick did to one particle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Respawned,
    /// Sample was undefined; the particle is marked for respawn.
    Expired,
    /// Segment queued in this bucket.
    Drawn(usize),
    /// Moved without a segment (next position undefined, or zero-velocity hole).
    Drifted,
}

#[derive(Debug, Clone)]
pub struct ParticleSystem {
    particles: Vec<Particle>,
    /// Particle indices per intensity bucket for the current tick.
    buckets: Vec<Vec<usize>>,
    max_age: f32,
    age_increment: f32,
    randomize_attempts: u32,
    policy: HolePolicy,
}

impl ParticleSystem {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            particles: Vec::new(),
            buckets: Vec::new(),
            max_age: config.max_particle_age,
            age_increment: config.age_increment,
            randomize_attempts: config.randomize_attempts,
            policy: config.hole_policy,
        }
    }

    /// Replaces the whole population with `count` particles at random defined positions
    /// and random ages in `[0, max_age)`.
    pub fn populate<R: Rng>(&mut self, cache: &ViewportFieldCache, count: usize, rng: &mut R) {
        self.particles.clear();
        self.particles.reserve(count);
        for _ in 0..count {
            let mut particle = Particle {
                age: (rng.random::<f32>() * self.max_age).floor(),
                ..Particle::default()
            };
            cache.randomize_into(&mut particle, rng, self.randomize_attempts);
            self.particles.push(particle);
        }
        self.buckets.iter_mut().for_each(Vec::clear);
    }

    pub fn clear(&mut self) {
        self.particles.clear();
        self.buckets.iter_mut().for_each(Vec::clear);
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn max_age(&self) -> f32 {
        self.max_age
    }

    /// Advances every particle by one tick and rebuilds the bucket lists.
    ///
    /// Positions of drawn particles are not committed until [`ParticleSystem::commit`].
    pub fn evolve<R: Rng>(&mut self, cache: &ViewportFieldCache, ramp: &IntensityRamp, rng: &mut R) {
        self.buckets.resize_with(ramp.len(), Vec::new);
        self.buckets.iter_mut().for_each(Vec::clear);

        for index in 0..self.particles.len() {
            if let TickOutcome::Drawn(bucket) = self.tick(index, cache, ramp, rng) {
                self.buckets[bucket].push(index);
            }
        }
    }

    fn tick<R: Rng>(
        &mut self,
        index: usize,
        cache: &ViewportFieldCache,
        ramp: &IntensityRamp,
        rng: &mut R,
    ) -> TickOutcome {
        let max_age = self.max_age;
        let policy = self.policy;
        let attempts = self.randomize_attempts;
        let particle = &mut self.particles[index];
        particle.target = None;

        if particle.age > max_age {
            cache.randomize_into(particle, rng, attempts);
            particle.age = 0.0;
            return TickOutcome::Respawned;
        }

        let outcome = match cache.sample(particle.x, particle.y) {
            None => match policy {
                HolePolicy::Lenient if cache.contains(particle.x, particle.y) => TickOutcome::Drifted,
                _ => {
                    particle.age = max_age;
                    TickOutcome::Expired
                }
            },
            Some(sample) => {
                let next = particle.position() + sample.displacement();
                if cache.is_defined(next.x, next.y) {
                    particle.target = Some(next);
                    TickOutcome::Drawn(ramp.index_for(sample.magnitude))
                } else {
                    particle.x = next.x;
                    particle.y = next.y;
                    TickOutcome::Drifted
                }
            }
        };

        particle.age += self.age_increment;
        outcome
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Indices of particles queued in `bucket` this tick.
    pub fn bucket(&self, bucket: usize) -> &[usize] {
        self.buckets.get(bucket).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn segments(&self, bucket: usize) -> impl Iterator<Item = Segment> + '_ {
        self.bucket(bucket).iter().filter_map(|&index| {
            let particle = &self.particles[index];
            particle.target.map(|to| Segment {
                from: particle.position(),
                to,
            })
        })
    }

    /// Moves every drawn particle to its pending position.
    pub fn commit(&mut self) {
        for particle in &mut self.particles {
            if let Some(target) = particle.target.take() {
                particle.x = target.x;
                particle.y = target.y;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::VectorField;
    use crate::grid::{GridHeader, GridRecord};
    use crate::viewport::{EquirectViewport, ViewportGeometry};
    use glam::DVec2;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rstest::rstest;

    /// 100x100 px view over a grid that covers only the left half (lon 0..5).
    fn half_covered_cache(policy: HolePolicy) -> (ViewportFieldCache, EngineConfig) {
        let config = EngineConfig {
            hole_policy: policy,
            ..EngineConfig::default()
        };
        let header = GridHeader::new(DVec2::new(0.0, 10.0), DVec2::new(1.0, -1.0), 6, 11);
        let u = GridRecord::new(header.with_parameter(2, 2), vec![Some(20.0); 66]).unwrap();
        let v = GridRecord::new(header.with_parameter(2, 3), vec![Some(0.0); 66]).unwrap();
        let field = VectorField::build(&u, &v, policy).unwrap();
        let map = EquirectViewport::new(ViewportGeometry::new(100, 100, DVec2::new(5.0, 5.0), 0.1));
        let cache = ViewportFieldCache::build(&map, &field, &config).unwrap();
        (cache, config)
    }

    fn ramp(config: &EngineConfig) -> IntensityRamp {
        IntensityRamp::from_config(config)
    }

    #[test]
    fn test_populate_exact_count_and_ages() {
        let (cache, config) = half_covered_cache(HolePolicy::Strict);
        let mut system = ParticleSystem::new(&config);
        let mut rng = StdRng::seed_from_u64(1);
        system.populate(&cache, 1400, &mut rng);
        assert_eq!(system.len(), 1400);
        for p in system.particles() {
            assert!(p.age >= 0.0 && p.age < config.max_particle_age);
            assert_eq!(p.age, p.age.floor());
            assert!(cache.contains(p.x, p.y));
        }
    }

    #[test]
    fn test_expired_particle_respawns_with_zero_age() {
        let (cache, config) = half_covered_cache(HolePolicy::Strict);
        let mut system = ParticleSystem::new(&config);
        let mut rng = StdRng::seed_from_u64(2);
        system.particles.push(Particle {
            x: 10.0,
            y: 10.0,
            age: config.max_particle_age + 1.0,
            target: None,
        });
        system.evolve(&cache, &ramp(&config), &mut rng);
        let p = system.particles()[0];
        assert_eq!(p.age, 0.0);
        assert!(cache.contains(p.x, p.y));
        assert!(p.target.is_none());
    }

    #[rstest]
    #[case(HolePolicy::Strict, TickOutcome::Expired)]
    #[case(HolePolicy::Lenient, TickOutcome::Drifted)]
    fn test_undefined_sample_inside_view(#[case] policy: HolePolicy, #[case] expected: TickOutcome) {
        let (cache, config) = half_covered_cache(policy);
        let mut system = ParticleSystem::new(&config);
        let mut rng = StdRng::seed_from_u64(3);
        system.particles.push(Particle {
            x: 90.0,
            y: 50.0,
            age: 10.0,
            target: None,
        });
        let outcome = system.tick(0, &cache, &ramp(&config), &mut rng);
        assert_eq!(outcome, expected);
        let p = system.particles()[0];
        match expected {
            TickOutcome::Expired => assert_eq!(p.age, config.max_particle_age + config.age_increment),
            _ => {
                assert_eq!(p.position(), Vec2::new(90.0, 50.0));
                assert!((p.age - 10.6).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_defined_step_is_deferred_until_commit() {
        let (cache, config) = half_covered_cache(HolePolicy::Strict);
        let mut system = ParticleSystem::new(&config);
        let mut rng = StdRng::seed_from_u64(4);
        system.particles.push(Particle {
            x: 20.0,
            y: 50.0,
            age: 0.0,
            target: None,
        });
        system.evolve(&cache, &ramp(&config), &mut rng);

        let drawn: usize = (0..system.bucket_count()).map(|b| system.bucket(b).len()).sum();
        assert_eq!(drawn, 1);
        let p = system.particles()[0];
        assert_eq!(p.position(), Vec2::new(20.0, 50.0));
        let target = p.target.unwrap();
        assert!(target.x > 20.0);

        system.commit();
        assert_eq!(system.particles()[0].position(), target);
        assert!(system.particles()[0].target.is_none());
    }

    #[test]
    fn test_step_into_undefined_moves_without_segment() {
        let (cache, config) = half_covered_cache(HolePolicy::Strict);
        let mut system = ParticleSystem::new(&config);
        let mut rng = StdRng::seed_from_u64(5);
        // Right at the data edge; one step east leaves coverage.
        system.particles.push(Particle {
            x: 49.9,
            y: 50.0,
            age: 0.0,
            target: None,
        });
        let outcome = system.tick(0, &cache, &ramp(&config), &mut rng);
        assert_eq!(outcome, TickOutcome::Drifted);
        assert!(system.particles()[0].x > 49.9);
    }

    #[test]
    fn test_age_never_overshoots_by_more_than_one_increment() {
        let (cache, config) = half_covered_cache(HolePolicy::Strict);
        let mut system = ParticleSystem::new(&config);
        let mut rng = StdRng::seed_from_u64(6);
        system.populate(&cache, 300, &mut rng);
        let ramp = ramp(&config);
        for _ in 0..400 {
            let before: Vec<f32> = system.particles().iter().map(|p| p.age).collect();
            system.evolve(&cache, &ramp, &mut rng);
            system.commit();
            for (p, old) in system.particles().iter().zip(before) {
                assert!(p.age <= config.max_particle_age + config.age_increment + 1e-4);
                assert!(p.age == 0.0 || p.age > old);
            }
        }
    }
}
