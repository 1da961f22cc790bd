//! Particle generator strategies, one per [`ParticleVariant`].
//!
//! Every strategy keeps its per-point state in vectors sized during `create`
//! and only overwrites them afterwards. Radii are in sphere units (the orb
//! itself has radius 1).

use std::f32::consts::{PI, TAU};

use crate::particle::{ParticleFrame, ParticleStrategy, ParticleVariant, ParticleVertex, Rng};

fn rgba(color: [f32; 3], alpha: f32) -> [f32; 4] {
    [color[0], color[1], color[2], alpha.clamp(0.0, 1.0)]
}

fn scale(v: [f32; 3], s: f32) -> [f32; 3] {
    [v[0] * s, v[1] * s, v[2] * s]
}

fn length(v: [f32; 3]) -> f32 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

fn normalize(v: [f32; 3]) -> [f32; 3] {
    let len = length(v);
    if len > 1e-6 {
        scale(v, 1.0 / len)
    } else {
        [0.0, 1.0, 0.0]
    }
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Fallback shell of points.
///
/// Update: radius breathes as `r0 * (1 + 0.12 * audio * sin(2 * speed * t + phase))`,
/// size grows by `1 + 1.5 * audio`, opacity is `0.35 + 0.55 * intensity`.
#[derive(Default)]
pub struct GenericShell {
    dirs: Vec<[f32; 3]>,
    radius: Vec<f32>,
    phase: Vec<f32>,
    base_size: Vec<f32>,
}

impl ParticleStrategy for GenericShell {
    fn variant(&self) -> ParticleVariant {
        ParticleVariant::Generic
    }

    fn create(&mut self, points: &mut [ParticleVertex], palette: &[[f32; 3]], rng: &mut Rng) {
        let n = points.len();
        self.dirs = Vec::with_capacity(n);
        self.radius = Vec::with_capacity(n);
        self.phase = Vec::with_capacity(n);
        self.base_size = Vec::with_capacity(n);
        for point in points.iter_mut() {
            let dir = rng.unit_vector();
            let radius = rng.range(1.35, 1.9);
            let size = rng.range(0.02, 0.05);
            self.dirs.push(dir);
            self.radius.push(radius);
            self.phase.push(rng.range(0.0, TAU));
            self.base_size.push(size);
            *point = ParticleVertex {
                position: scale(dir, radius),
                size,
                color: rgba(*rng.pick(palette), 0.6),
            };
        }
    }

    fn update(&mut self, points: &mut [ParticleVertex], frame: &ParticleFrame) {
        let alpha = 0.35 + 0.55 * frame.intensity;
        for (i, point) in points.iter_mut().enumerate() {
            let wobble = (2.0 * frame.speed * frame.time + self.phase[i]).sin();
            let r = self.radius[i] * (1.0 + 0.12 * frame.audio_level * wobble);
            point.position = scale(self.dirs[i], r);
            point.size = self.base_size[i] * (1.0 + 1.5 * frame.audio_level);
            point.color[3] = alpha;
        }
    }

    fn rotation_rate(&self) -> f32 {
        0.15
    }
}

const ORBIT_RINGS: usize = 5;

/// Tilted rings of orbiting sparks.
///
/// Update: each angle advances by `omega * (1 + 2 * audio) * speed * dt`;
/// ring radius ripples by `0.25 * audio * sin(3 * angle + t)`; opacity and
/// size follow `0.5 + 0.5 * audio` and `1 + audio`.
#[derive(Default)]
pub struct RadialOrbit {
    angle: Vec<f32>,
    omega: Vec<f32>,
    ring_radius: Vec<f32>,
    tilt: Vec<f32>,
    base_size: Vec<f32>,
}

impl ParticleStrategy for RadialOrbit {
    fn variant(&self) -> ParticleVariant {
        ParticleVariant::RadialOrbit
    }

    fn create(&mut self, points: &mut [ParticleVertex], palette: &[[f32; 3]], rng: &mut Rng) {
        let n = points.len();
        self.angle = Vec::with_capacity(n);
        self.omega = Vec::with_capacity(n);
        self.ring_radius = Vec::with_capacity(n);
        self.tilt = Vec::with_capacity(n);
        self.base_size = Vec::with_capacity(n);
        for (i, point) in points.iter_mut().enumerate() {
            let ring = i % ORBIT_RINGS;
            let direction = if ring % 2 == 0 { 1.0 } else { -1.0 };
            self.angle.push(rng.range(0.0, TAU));
            self.omega.push(direction * rng.range(0.4, 0.9));
            self.ring_radius.push(1.4 + 0.18 * ring as f32 + rng.range(-0.03, 0.03));
            self.tilt.push(ring as f32 * PI / ORBIT_RINGS as f32);
            self.base_size.push(rng.range(0.015, 0.04));
            *point = ParticleVertex {
                position: [0.0; 3],
                size: self.base_size[i],
                color: rgba(palette[ring % palette.len()], 0.5),
            };
        }
        self.update(points, &ParticleFrame::default());
    }

    fn update(&mut self, points: &mut [ParticleVertex], frame: &ParticleFrame) {
        let boost = 1.0 + 2.0 * frame.audio_level;
        for (i, point) in points.iter_mut().enumerate() {
            self.angle[i] = (self.angle[i] + self.omega[i] * boost * frame.speed * frame.dt) % TAU;
            let a = self.angle[i];
            let r = self.ring_radius[i] + 0.25 * frame.audio_level * (3.0 * a + frame.time).sin();
            let (sin_t, cos_t) = self.tilt[i].sin_cos();
            point.position = [r * a.cos(), r * a.sin() * sin_t, r * a.sin() * cos_t];
            point.size = self.base_size[i] * (1.0 + frame.audio_level);
            point.color[3] = 0.5 + 0.5 * frame.audio_level;
        }
    }

    fn rotation_rate(&self) -> f32 {
        0.05
    }
}

const CASCADE_TOP: f32 = 2.2;
const CASCADE_BOTTOM: f32 = -2.2;

/// Columns of glyph-like points raining around the orb.
///
/// Update: `y -= v * (0.5 + 1.5 * audio) * (0.5 + speed) * dt`, wrapping from
/// the bottom back to the top. Opacity fades along each column's trail as
/// `(0.3 + 0.7 * intensity) * (1 - fract(0.8 * (y + column_phase)))`.
#[derive(Default)]
pub struct FallingCascade {
    fall_speed: Vec<f32>,
    column_phase: Vec<f32>,
}

impl ParticleStrategy for FallingCascade {
    fn variant(&self) -> ParticleVariant {
        ParticleVariant::FallingCascade
    }

    fn create(&mut self, points: &mut [ParticleVertex], palette: &[[f32; 3]], rng: &mut Rng) {
        let n = points.len();
        let columns = (n / 24).max(1);
        let column_angles: Vec<f32> = (0..columns).map(|_| rng.range(0.0, TAU)).collect();
        let column_radii: Vec<f32> = (0..columns).map(|_| rng.range(1.6, 2.4)).collect();
        let column_speed: Vec<f32> = (0..columns).map(|_| rng.range(0.6, 1.4)).collect();

        self.fall_speed = Vec::with_capacity(n);
        self.column_phase = Vec::with_capacity(n);
        for (i, point) in points.iter_mut().enumerate() {
            let c = i % columns;
            let (sin_a, cos_a) = column_angles[c].sin_cos();
            self.fall_speed.push(column_speed[c]);
            self.column_phase.push(c as f32 * 0.37);
            *point = ParticleVertex {
                position: [
                    cos_a * column_radii[c],
                    rng.range(CASCADE_BOTTOM, CASCADE_TOP),
                    sin_a * column_radii[c],
                ],
                size: 0.03,
                color: rgba(palette[(i / columns) % 2], 0.8),
            };
        }
    }

    fn update(&mut self, points: &mut [ParticleVertex], frame: &ParticleFrame) {
        let drive = (0.5 + 1.5 * frame.audio_level) * (0.5 + frame.speed) * frame.dt;
        let span = CASCADE_TOP - CASCADE_BOTTOM;
        let brightness = 0.3 + 0.7 * frame.intensity;
        for (i, point) in points.iter_mut().enumerate() {
            let mut y = point.position[1] - self.fall_speed[i] * drive;
            while y < CASCADE_BOTTOM {
                y += span;
            }
            point.position[1] = y;
            let trail = (0.8 * (y + self.column_phase[i])).rem_euclid(1.0);
            point.color[3] = brightness * (1.0 - trail);
        }
    }

    fn rotation_rate(&self) -> f32 {
        0.0
    }
}

const NEURON_RADIUS: f32 = 1.6;

/// Neuron nodes on a shell with signals travelling along links between them.
///
/// The first quarter of the points are nodes; node radius pulses by
/// `0.05 * audio * sin(3t + i)`. Each remaining point travels from node `a`
/// to node `b` with progress `fract(rate * (0.5 + speed) * t + phase)`, bowed
/// outward by `0.15 * sin(pi * progress)` and faded by
/// `(0.2 + 0.8 * audio) * sin(pi * progress)`.
#[derive(Default)]
pub struct SynapticLinks {
    nodes: Vec<[f32; 3]>,
    links: Vec<(usize, usize)>,
    rate: Vec<f32>,
    phase: Vec<f32>,
}

impl ParticleStrategy for SynapticLinks {
    fn variant(&self) -> ParticleVariant {
        ParticleVariant::SynapticLinks
    }

    fn create(&mut self, points: &mut [ParticleVertex], palette: &[[f32; 3]], rng: &mut Rng) {
        let n = points.len();
        let node_count = (n / 4).max(1);
        self.nodes = (0..node_count).map(|_| rng.unit_vector()).collect();

        let signals = n - node_count;
        self.links = Vec::with_capacity(signals);
        self.rate = Vec::with_capacity(signals);
        self.phase = Vec::with_capacity(signals);
        for _ in 0..signals {
            let a = (rng.next_u64() % node_count as u64) as usize;
            // Link each signal to the closest of a few random candidates.
            let mut best = a;
            let mut best_distance = f32::MAX;
            for _ in 0..4 {
                let b = (rng.next_u64() % node_count as u64) as usize;
                if b == a {
                    continue;
                }
                let (p, q) = (self.nodes[a], self.nodes[b]);
                let d = length([p[0] - q[0], p[1] - q[1], p[2] - q[2]]);
                if d < best_distance {
                    best = b;
                    best_distance = d;
                }
            }
            self.links.push((a, best));
            self.rate.push(rng.range(0.2, 0.6));
            self.phase.push(rng.next_f32());
        }

        for (i, point) in points.iter_mut().enumerate() {
            *point = if i < node_count {
                ParticleVertex {
                    position: scale(self.nodes[i], NEURON_RADIUS),
                    size: 0.05,
                    color: rgba(palette[0], 0.85),
                }
            } else {
                ParticleVertex {
                    position: scale(self.nodes[self.links[i - node_count].0], NEURON_RADIUS),
                    size: 0.025,
                    color: rgba(palette[1], 0.0),
                }
            };
        }
    }

    fn update(&mut self, points: &mut [ParticleVertex], frame: &ParticleFrame) {
        let node_count = self.nodes.len();
        for (i, point) in points.iter_mut().enumerate() {
            if i < node_count {
                let pulse = 1.0 + 0.05 * frame.audio_level * (3.0 * frame.time + i as f32).sin();
                point.position = scale(self.nodes[i], NEURON_RADIUS * pulse);
                point.size = 0.05 * (1.0 + frame.audio_level);
                continue;
            }
            let s = i - node_count;
            let (a, b) = self.links[s];
            let progress = (self.rate[s] * (0.5 + frame.speed) * frame.time + self.phase[s]).rem_euclid(1.0);
            let (p, q) = (self.nodes[a], self.nodes[b]);
            let mid = normalize([
                p[0] + (q[0] - p[0]) * progress,
                p[1] + (q[1] - p[1]) * progress,
                p[2] + (q[2] - p[2]) * progress,
            ]);
            let arc = (PI * progress).sin();
            point.position = scale(mid, NEURON_RADIUS * (1.0 + 0.15 * arc));
            point.color[3] = ((0.2 + 0.8 * frame.audio_level) * arc).clamp(0.0, 1.0);
        }
    }

    fn rotation_rate(&self) -> f32 {
        0.08
    }
}

/// Probability-cloud points that jitter and occasionally tunnel.
///
/// Update: position is `base + jitter * random(-1, 1)^3` with
/// `jitter = 0.02 + 0.3 * audio * intensity`; each frame a point tunnels to
/// the antipode with probability `0.01 * audio * speed`; opacity flickers
/// uniformly in `[0.3, 1.0]`. Randomness comes from a strategy-owned
/// generator, so runs are reproducible.
pub struct QuantumJitter {
    base: Vec<[f32; 3]>,
    rng: Rng,
}

impl Default for QuantumJitter {
    fn default() -> Self {
        Self {
            base: Vec::new(),
            rng: Rng::new(0),
        }
    }
}

impl ParticleStrategy for QuantumJitter {
    fn variant(&self) -> ParticleVariant {
        ParticleVariant::QuantumJitter
    }

    fn create(&mut self, points: &mut [ParticleVertex], palette: &[[f32; 3]], rng: &mut Rng) {
        self.rng = Rng::new(rng.next_u64());
        self.base = Vec::with_capacity(points.len());
        for point in points.iter_mut() {
            let base = scale(rng.unit_vector(), rng.range(1.3, 1.8));
            self.base.push(base);
            *point = ParticleVertex {
                position: base,
                size: rng.range(0.015, 0.035),
                color: rgba(*rng.pick(palette), 0.7),
            };
        }
    }

    fn update(&mut self, points: &mut [ParticleVertex], frame: &ParticleFrame) {
        let jitter = 0.02 + 0.3 * frame.audio_level * frame.intensity;
        let tunnel_chance = 0.01 * frame.audio_level * frame.speed;
        for (i, point) in points.iter_mut().enumerate() {
            if self.rng.next_f32() < tunnel_chance {
                self.base[i] = scale(self.base[i], -1.0);
            }
            let base = self.base[i];
            for (axis, component) in point.position.iter_mut().enumerate() {
                *component = base[axis] + jitter * self.rng.range(-1.0, 1.0).powi(3);
            }
            point.color[3] = self.rng.range(0.3, 1.0);
        }
    }
}

const TETRAHEDRON: [[f32; 3]; 4] = [
    [1.0, 1.0, 1.0],
    [1.0, -1.0, -1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0],
];

/// Self-similar Sierpinski tetrahedron built by the chaos game.
///
/// Update: the whole set breathes by `1 + 0.25 * audio * sin(1.5 * speed * t + 4 * d)`
/// where `d` is the point's distance from the centre, scaled by
/// `1 + 0.1 * intensity`; opacity is `0.4 + 0.6 * audio`.
#[derive(Default)]
pub struct FractalPoints {
    base: Vec<[f32; 3]>,
    distance: Vec<f32>,
    base_size: Vec<f32>,
}

impl ParticleStrategy for FractalPoints {
    fn variant(&self) -> ParticleVariant {
        ParticleVariant::FractalPoints
    }

    fn create(&mut self, points: &mut [ParticleVertex], palette: &[[f32; 3]], rng: &mut Rng) {
        let n = points.len();
        self.base = Vec::with_capacity(n);
        self.distance = Vec::with_capacity(n);
        self.base_size = Vec::with_capacity(n);

        let mut p = [0.0f32; 3];
        // Burn in so the walk sits on the attractor.
        for _ in 0..16 {
            let v = rng.pick(&TETRAHEDRON);
            p = [(p[0] + v[0]) * 0.5, (p[1] + v[1]) * 0.5, (p[2] + v[2]) * 0.5];
        }
        for point in points.iter_mut() {
            let corner = (rng.next_u64() % 4) as usize;
            let v = TETRAHEDRON[corner];
            p = [(p[0] + v[0]) * 0.5, (p[1] + v[1]) * 0.5, (p[2] + v[2]) * 0.5];
            let base = scale(p, 1.2);
            let d = length(base);
            self.base.push(base);
            self.distance.push(d);
            self.base_size.push(0.012 + 0.01 * (1.0 - d / 2.1).max(0.0));
            *point = ParticleVertex {
                position: base,
                size: self.base_size[self.base_size.len() - 1],
                color: rgba(palette[corner % palette.len()], 0.6),
            };
        }
    }

    fn update(&mut self, points: &mut [ParticleVertex], frame: &ParticleFrame) {
        let spread = 1.0 + 0.1 * frame.intensity;
        for (i, point) in points.iter_mut().enumerate() {
            let breathe = 1.0
                + 0.25 * frame.audio_level * (1.5 * frame.speed * frame.time + 4.0 * self.distance[i]).sin();
            point.position = scale(self.base[i], breathe * spread);
            point.size = self.base_size[i] * (1.0 + 0.5 * frame.audio_level);
            point.color[3] = 0.4 + 0.6 * frame.audio_level;
        }
    }

    fn rotation_rate(&self) -> f32 {
        0.2
    }
}

const MOTE_SPAWN_RADIUS: f32 = 1.2;
const MOTE_MAX_RADIUS: f32 = 3.0;

/// Slow motes drifting outward through a swirling field.
///
/// Update: `p += (v + 0.15 * swirl(p, t) + up * 0.05) * dt * (0.3 + speed) * (1 + audio)`
/// with `swirl = (sin(1.3 y + t), cos(1.1 z + t), sin(0.9 x + t))`; motes
/// beyond radius 3 respawn at radius 1.2; opacity fades out between radius
/// 2.2 and 3 and scales with `0.5 + 0.5 * intensity`.
#[derive(Default)]
pub struct DriftingMotes {
    velocity: Vec<[f32; 3]>,
    spawn: Vec<[f32; 3]>,
    base_size: Vec<f32>,
}

impl ParticleStrategy for DriftingMotes {
    fn variant(&self) -> ParticleVariant {
        ParticleVariant::DriftingMotes
    }

    fn create(&mut self, points: &mut [ParticleVertex], palette: &[[f32; 3]], rng: &mut Rng) {
        let n = points.len();
        self.velocity = Vec::with_capacity(n);
        self.spawn = Vec::with_capacity(n);
        self.base_size = Vec::with_capacity(n);
        for point in points.iter_mut() {
            let dir = rng.unit_vector();
            self.spawn.push(scale(dir, MOTE_SPAWN_RADIUS));
            self.velocity.push(scale(dir, rng.range(0.05, 0.2)));
            self.base_size.push(rng.range(0.03, 0.07));
            *point = ParticleVertex {
                position: scale(dir, rng.range(MOTE_SPAWN_RADIUS, 2.6)),
                size: self.base_size[self.base_size.len() - 1],
                color: rgba(*rng.pick(palette), 0.3),
            };
        }
    }

    fn update(&mut self, points: &mut [ParticleVertex], frame: &ParticleFrame) {
        let step = frame.dt * (0.3 + frame.speed) * (1.0 + frame.audio_level);
        let t = frame.time;
        let presence = 0.5 + 0.5 * frame.intensity;
        for (i, point) in points.iter_mut().enumerate() {
            let [x, y, z] = point.position;
            let v = self.velocity[i];
            let swirl = [(1.3 * y + t).sin(), (1.1 * z + t).cos(), (0.9 * x + t).sin()];
            let mut p = [
                x + (v[0] + 0.15 * swirl[0]) * step,
                y + (v[1] + 0.15 * swirl[1] + 0.05) * step,
                z + (v[2] + 0.15 * swirl[2]) * step,
            ];
            let mut r = length(p);
            if r > MOTE_MAX_RADIUS {
                p = self.spawn[i];
                r = MOTE_SPAWN_RADIUS;
            }
            point.position = p;
            point.size = self.base_size[i] * (1.0 + 0.8 * frame.audio_level);
            point.color[3] = 0.6 * (1.0 - smoothstep(2.2, MOTE_MAX_RADIUS, r)) * presence;
        }
    }

    fn rotation_rate(&self) -> f32 {
        0.02
    }
}

const WAVE_SOURCES: [[f32; 3]; 2] = [[0.96, 0.28, 0.0], [-0.96, -0.28, 0.0]];

/// Lattice shell displaced by two interfering waves.
///
/// Update: with `d1`, `d2` the distances to two fixed sources,
/// `h = 0.5 * (sin(9 d1 - w t) + sin(9 d2 - w t))` and `w = 2 * (0.5 + speed)`;
/// radius is `1.55 + 0.12 * h * (0.3 + audio)`, opacity
/// `0.15 + 0.6 * (0.5 + 0.5 h) * (0.4 + 0.6 * intensity)`.
#[derive(Default)]
pub struct InterferenceField {
    dirs: Vec<[f32; 3]>,
    distances: Vec<[f32; 2]>,
}

impl ParticleStrategy for InterferenceField {
    fn variant(&self) -> ParticleVariant {
        ParticleVariant::InterferenceField
    }

    fn create(&mut self, points: &mut [ParticleVertex], palette: &[[f32; 3]], _rng: &mut Rng) {
        let n = points.len();
        let rows = ((n as f32).sqrt().ceil() as usize).max(1);
        let cols = n.div_ceil(rows).max(1);
        self.dirs = Vec::with_capacity(n);
        self.distances = Vec::with_capacity(n);
        for (i, point) in points.iter_mut().enumerate() {
            let (row, col) = (i / cols, i % cols);
            let theta = PI * (row as f32 + 0.5) / rows as f32;
            let phi = TAU * col as f32 / cols as f32;
            let dir = [theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin()];
            let d = WAVE_SOURCES.map(|s| length([dir[0] - s[0], dir[1] - s[1], dir[2] - s[2]]));
            self.dirs.push(dir);
            self.distances.push(d);
            *point = ParticleVertex {
                position: scale(dir, 1.55),
                size: 0.02,
                color: rgba(palette[row % palette.len()], 0.4),
            };
        }
    }

    fn update(&mut self, points: &mut [ParticleVertex], frame: &ParticleFrame) {
        let omega = 2.0 * (0.5 + frame.speed);
        let wt = omega * frame.time;
        let clarity = 0.4 + 0.6 * frame.intensity;
        for (i, point) in points.iter_mut().enumerate() {
            let [d1, d2] = self.distances[i];
            let h = 0.5 * ((9.0 * d1 - wt).sin() + (9.0 * d2 - wt).sin());
            point.position = scale(self.dirs[i], 1.55 + 0.12 * h * (0.3 + frame.audio_level));
            point.size = 0.02 * (1.0 + frame.audio_level * (0.5 + 0.5 * h));
            point.color[3] = 0.15 + 0.6 * (0.5 + 0.5 * h) * clarity;
        }
    }

    fn rotation_rate(&self) -> f32 {
        0.04
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::Zeroable;

    const ALL: [ParticleVariant; 8] = [
        ParticleVariant::Generic,
        ParticleVariant::RadialOrbit,
        ParticleVariant::FallingCascade,
        ParticleVariant::SynapticLinks,
        ParticleVariant::QuantumJitter,
        ParticleVariant::FractalPoints,
        ParticleVariant::DriftingMotes,
        ParticleVariant::InterferenceField,
    ];
    const PALETTE: [[f32; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

    fn run(variant: ParticleVariant, count: usize, seed: u64, frames: usize, audio: f32) -> Vec<ParticleVertex> {
        let mut strategy = variant.strategy();
        assert_eq!(strategy.variant(), variant);
        let mut points = vec![ParticleVertex::zeroed(); count];
        strategy.create(&mut points, &PALETTE, &mut Rng::new(seed));
        for f in 0..frames {
            let frame = ParticleFrame {
                time: f as f32 / 60.0,
                dt: 1.0 / 60.0,
                audio_level: audio,
                intensity: 0.8,
                speed: 1.5,
            };
            strategy.update(&mut points, &frame);
        }
        points
    }

    #[test]
    fn test_every_variant_stays_finite_and_bounded() {
        for variant in ALL {
            for count in [1, 7, 200] {
                let points = run(variant, count, 11, 240, 1.0);
                assert_eq!(points.len(), count);
                for p in &points {
                    assert!(p.position.iter().all(|c| c.is_finite()), "{variant:?}");
                    assert!(length(p.position) < 4.0, "{variant:?} escaped: {:?}", p.position);
                    assert!((0.0..=1.0).contains(&p.color[3]), "{variant:?} alpha {}", p.color[3]);
                    assert!(p.size >= 0.0);
                }
            }
        }
    }

    #[test]
    fn test_same_seed_same_layout() {
        for variant in ALL {
            assert_eq!(run(variant, 64, 5, 30, 0.5), run(variant, 64, 5, 30, 0.5), "{variant:?}");
        }
    }

    #[test]
    fn test_cascade_wraps_to_top() {
        let points = run(ParticleVariant::FallingCascade, 48, 3, 2000, 1.0);
        assert!(points
            .iter()
            .all(|p| p.position[1] >= CASCADE_BOTTOM && p.position[1] <= CASCADE_TOP));
    }

    #[test]
    fn test_silence_keeps_generic_shell_still() {
        let a = run(ParticleVariant::Generic, 32, 2, 10, 0.0);
        let b = run(ParticleVariant::Generic, 32, 2, 50, 0.0);
        for (p, q) in a.iter().zip(&b) {
            assert!((length(p.position) - length(q.position)).abs() < 1e-5);
        }
    }

    #[test]
    fn test_synaptic_nodes_come_first() {
        let points = run(ParticleVariant::SynapticLinks, 40, 8, 1, 0.0);
        for node in &points[..10] {
            assert!((length(node.position) - NEURON_RADIUS).abs() < 1e-4);
        }
    }

    #[test]
    fn test_motes_respawn_inside_bounds() {
        let points = run(ParticleVariant::DriftingMotes, 64, 4, 5000, 1.0);
        assert!(points.iter().all(|p| length(p.position) <= MOTE_MAX_RADIUS + 0.1));
    }
}
