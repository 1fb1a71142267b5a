//! Behavioral tests for the simulation controller.
//!
//! GPU-dependent tests acquire an adapter first and return early when none is
//! available, so the suite passes on headless machines.

use std::sync::{Arc, Mutex};

use force_layout::adaptive::ModePreference;
use force_layout::config::AdaptiveOptions;
use force_layout::events::SimulationEvent;
use force_layout::forces::{Center, Collide, ForceX, ForceY, LinkForce, ManyBody, Radial};
use force_layout::graph::GraphFile;
use force_layout::{BackendKind, Link, Node, Simulation, SimulationState};

fn options(mode: ModePreference) -> AdaptiveOptions {
    AdaptiveOptions {
        mode,
        enable_switching: false,
        frame_interval_ms: 0,
        ..AdaptiveOptions::default()
    }
}

fn unplaced(n: usize) -> Vec<Node> {
    (0..n).map(|_| Node::new()).collect()
}

fn chain(n: usize) -> Vec<Link> {
    (1..n).map(|i| Link::new(i - 1, i)).collect()
}

/// Register the built-in forces in the order the GPU evaluates them
fn add_standard_forces(sim: &mut Simulation, links: Vec<Link>) {
    sim.set_force("charge", Some(Box::new(ManyBody::new())))
        .unwrap();
    sim.set_force("link", Some(Box::new(LinkForce::new(links))))
        .unwrap();
    sim.set_force("collide", Some(Box::new(Collide::new().radius(4.0))))
        .unwrap();
    sim.set_force("x", Some(Box::new(ForceX::new(0.0).strength(0.05))))
        .unwrap();
    sim.set_force("y", Some(Box::new(ForceY::new(0.0).strength(0.05))))
        .unwrap();
    sim.set_force("radial", Some(Box::new(Radial::new(60.0, 0.0, 0.0).strength(0.02))))
        .unwrap();
    sim.set_force("center", Some(Box::new(Center::new(0.0, 0.0))))
        .unwrap();
}

fn extent(nodes: &[Node]) -> f32 {
    nodes
        .iter()
        .map(|n| n.x.abs().max(n.y.abs()))
        .fold(1.0, f32::max)
}

fn assert_close(actual: &[Node], expected: &[Node], relative: f32) {
    let tolerance = relative * extent(expected);
    for (a, e) in actual.iter().zip(expected) {
        assert!(
            (a.x - e.x).abs() <= tolerance && (a.y - e.y).abs() <= tolerance,
            "node {}: ({}, {}) vs ({}, {})",
            e.index,
            a.x,
            a.y,
            e.x,
            e.y
        );
    }
}

#[tokio::test]
async fn cooling_is_monotonic_and_end_fires_once() {
    let mut sim = Simulation::with_options(unplaced(20), options(ModePreference::Cpu));
    sim.set_force("charge", Some(Box::new(ManyBody::new())))
        .unwrap();

    let alphas = Arc::new(Mutex::new(Vec::new()));
    let ends = Arc::new(Mutex::new(Vec::new()));
    let a = Arc::clone(&alphas);
    let e = Arc::clone(&ends);
    sim.on(
        "tick",
        Some(Box::new(move |event: &SimulationEvent| {
            if let SimulationEvent::Tick { alpha } = event {
                a.lock().unwrap().push(*alpha);
            }
        })),
    )
    .unwrap()
    .on(
        "end",
        Some(Box::new(move |event: &SimulationEvent| {
            if let SimulationEvent::End { alpha } = event {
                e.lock().unwrap().push(*alpha);
            }
        })),
    )
    .unwrap();

    sim.run().await.unwrap();

    let alphas = alphas.lock().unwrap();
    assert!(alphas.windows(2).all(|w| w[1] <= w[0]));
    let first_below = alphas.iter().position(|&a| a < 0.001).unwrap();
    assert_eq!(first_below, alphas.len() - 1);
    assert_eq!(*ends.lock().unwrap(), [alphas[first_below]]);
    assert_eq!(sim.state(), SimulationState::Stopped);
}

#[tokio::test]
async fn fixed_nodes_hold_their_position() {
    let mut nodes = unplaced(12);
    nodes[0] = Node::new().with_fixed(5.0, -5.0);
    nodes[3].fx = Some(-20.0);
    let mut sim = Simulation::with_options(nodes, options(ModePreference::Cpu));
    add_standard_forces(&mut sim, chain(12));

    for _ in 0..30 {
        sim.tick(1).await.unwrap();
        let nodes = sim.nodes();
        assert_eq!((nodes[0].x, nodes[0].y), (5.0, -5.0));
        assert_eq!((nodes[0].vx, nodes[0].vy), (0.0, 0.0));
        assert_eq!((nodes[3].x, nodes[3].vx), (-20.0, 0.0));
        assert!(nodes[3].vy.is_finite());
    }
}

#[tokio::test]
async fn coincident_nodes_separate_without_nan() {
    let mut sim = Simulation::with_options(
        vec![Node::at(0.0, 0.0), Node::at(0.0, 0.0)],
        options(ModePreference::Cpu),
    );
    sim.set_force("charge", Some(Box::new(ManyBody::new())))
        .unwrap();
    sim.set_force("collide", Some(Box::new(Collide::new())))
        .unwrap();

    sim.tick(1).await.unwrap();
    let nodes = sim.nodes();
    assert!(nodes
        .iter()
        .all(|n| n.x.is_finite() && n.y.is_finite() && n.vx.is_finite() && n.vy.is_finite()));
    assert_ne!((nodes[0].x, nodes[0].y), (nodes[1].x, nodes[1].y));

    // Same inputs, same separation
    let mut again = Simulation::with_options(
        vec![Node::at(0.0, 0.0), Node::at(0.0, 0.0)],
        options(ModePreference::Cpu),
    );
    again
        .set_force("charge", Some(Box::new(ManyBody::new())))
        .unwrap();
    again
        .set_force("collide", Some(Box::new(Collide::new())))
        .unwrap();
    again.tick(1).await.unwrap();
    assert_eq!(again.nodes(), nodes);
}

#[tokio::test]
async fn four_nodes_cool_without_overlap() {
    let nodes = (0..4)
        .map(|i| {
            let angle = i as f32 * std::f32::consts::FRAC_PI_2;
            Node::at(10.0 * angle.cos(), 10.0 * angle.sin())
        })
        .collect();
    let mut sim = Simulation::with_options(nodes, options(ModePreference::Cpu));
    sim.set_force("charge", Some(Box::new(ManyBody::new().strength(-30.0))))
        .unwrap();
    sim.set_force(
        "collide",
        Some(Box::new(Collide::new().radius(5.0).strength(1.0))),
    )
    .unwrap();

    sim.tick(300).await.unwrap();
    assert!(sim.alpha() < 0.001);

    let nodes = sim.nodes();
    for i in 0..nodes.len() {
        for j in i + 1..nodes.len() {
            let d = nodes[i].distance_squared(nodes[j].x, nodes[j].y).sqrt();
            assert!(d >= 10.0 - 1e-3, "nodes {i} and {j} overlap: {d}");
        }
    }
}

#[tokio::test]
async fn link_deviation_decreases_every_step() {
    let graph = GraphFile::generate_random(100, 120, 42);
    let (nodes, links) = graph.to_simulation().unwrap();
    let mut sim = Simulation::with_options(nodes, options(ModePreference::Cpu));
    sim.set_force("link", Some(Box::new(LinkForce::new(links.clone()))))
        .unwrap();

    let deviation = |nodes: &[Node]| -> f64 {
        links
            .iter()
            .map(|l| {
                let s = &nodes[l.source];
                let t = &nodes[l.target];
                let d = f64::from(s.distance_squared(t.x, t.y)).sqrt() - 30.0;
                d * d
            })
            .sum()
    };

    let mut previous = deviation(sim.nodes());
    for step in 0..50 {
        sim.tick(1).await.unwrap();
        let current = deviation(sim.nodes());
        assert!(
            current < previous,
            "deviation rose at step {step}: {previous} -> {current}"
        );
        previous = current;
    }
}

#[tokio::test]
async fn explicit_gpu_request_never_fails() {
    let mut sim = Simulation::with_options(unplaced(30), options(ModePreference::Gpu));
    add_standard_forces(&mut sim, chain(30));

    let mode = sim.initialize().await.unwrap();
    sim.tick(5).await.unwrap();
    assert_eq!(sim.mode(), mode);
    assert!(sim.nodes().iter().all(|n| n.x.is_finite() && n.y.is_finite()));
    sim.destroy();
}

#[tokio::test]
async fn backends_agree_on_small_graphs() {
    let mut gpu = Simulation::with_options(unplaced(40), options(ModePreference::Gpu));
    add_standard_forces(&mut gpu, chain(40));
    if gpu.initialize().await.unwrap() != BackendKind::Gpu {
        eprintln!("skipping: no GPU adapter");
        return;
    }
    let mut cpu = Simulation::with_options(unplaced(40), options(ModePreference::Cpu));
    add_standard_forces(&mut cpu, chain(40));

    gpu.tick(20).await.unwrap();
    cpu.tick(20).await.unwrap();
    assert_eq!(gpu.alpha(), cpu.alpha());
    assert_close(gpu.nodes(), cpu.nodes(), 1e-3);
}

#[tokio::test]
async fn switching_mid_run_keeps_the_trajectory() {
    let mut reference = Simulation::with_options(unplaced(25), options(ModePreference::Cpu));
    add_standard_forces(&mut reference, chain(25));
    reference.tick(100).await.unwrap();

    let mut switched = Simulation::with_options(unplaced(25), options(ModePreference::Cpu));
    add_standard_forces(&mut switched, chain(25));
    switched.tick(10).await.unwrap();
    let mode = switched.force_mode(BackendKind::Gpu).await.unwrap();
    switched.tick(90).await.unwrap();

    assert_eq!(switched.alpha(), reference.alpha());
    if mode == BackendKind::Cpu {
        // No adapter: the request fell back and nothing changed
        assert_eq!(switched.nodes(), reference.nodes());
    } else {
        assert_close(switched.nodes(), reference.nodes(), 1e-2);
    }

    // And back again
    assert_eq!(
        switched.force_mode(BackendKind::Cpu).await.unwrap(),
        BackendKind::Cpu
    );
    switched.tick(1).await.unwrap();
}

#[tokio::test]
async fn mode_events_report_selection() {
    let mut sim = Simulation::with_options(unplaced(10), options(ModePreference::Auto));
    let modes = Arc::new(Mutex::new(Vec::new()));
    let m = Arc::clone(&modes);
    sim.on(
        "mode.log",
        Some(Box::new(move |event: &SimulationEvent| {
            if let SimulationEvent::ModeChange { mode, reason } = event {
                m.lock().unwrap().push((*mode, reason.clone()));
            }
        })),
    )
    .unwrap();

    sim.tick(1).await.unwrap();
    let modes = modes.lock().unwrap();
    assert_eq!(modes.len(), 1);
    assert_eq!(modes[0].0, BackendKind::Cpu);
    assert!(modes[0].1.contains("10 nodes"), "{}", modes[0].1);
}

#[tokio::test]
async fn replacing_nodes_reinitializes_forces() {
    let mut sim = Simulation::with_options(unplaced(5), options(ModePreference::Cpu));
    sim.set_force("link", Some(Box::new(LinkForce::new(chain(5)))))
        .unwrap();
    sim.tick(3).await.unwrap();

    sim.set_nodes(unplaced(8)).unwrap();
    assert_eq!(sim.nodes().len(), 8);
    assert_eq!(sim.nodes()[7].index, 7);
    sim.tick(3).await.unwrap();
    assert!(sim.nodes().iter().all(|n| n.x.is_finite()));
}

#[tokio::test]
async fn stats_reflect_the_active_mode() {
    let mut sim = Simulation::with_options(unplaced(5), options(ModePreference::Cpu));
    sim.tick(2).await.unwrap();
    let stats = sim.performance_stats();
    assert_eq!(stats.mode, BackendKind::Cpu);
    assert!(stats.avg_fps >= 0.0);
}
