//! WGSL compute shaders for the GPU force simulation
//!
//! Every kernel is compiled as its own module: the shared [`TYPES`] prelude
//! followed by the kernel body. One invocation owns one node and is the only
//! writer of that node's record, so kernels never race on node state.
//!
//! Kernels mirror the CPU forces in [`crate::forces`] operation for operation,
//! including the deterministic jitter from [`crate::jiggle`].

/// Workgroup size and tile width for every kernel
pub const WORKGROUP_SIZE: u32 = 256;

/// Common types, bindings and helpers shared by all shaders
pub const TYPES: &str = r#"
struct Node {
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    fx: f32,
    fy: f32,
    strength: f32,
    radius: f32,
}

struct Link {
    source: u32,
    target_node: u32,
    distance: f32,
    strength: f32,
    bias: f32,
    _pad0: f32,
    _pad1: f32,
    _pad2: f32,
}

struct Params {
    alpha: f32,
    velocity_decay: f32,
    node_count: u32,
    link_count: u32,
    center_x: f32,
    center_y: f32,
    center_strength: f32,
    theta2: f32,
    distance_min2: f32,
    distance_max2: f32,
    link_iterations: u32,
    collision_radius: f32,
    collision_strength: f32,
    collision_iterations: u32,
    x_target: f32,
    x_strength: f32,
    y_target: f32,
    y_strength: f32,
    radial_x: f32,
    radial_y: f32,
    radial_radius: f32,
    radial_strength: f32,
    _pad0: f32,
    _pad1: f32,
}

@group(0) @binding(0) var<storage, read_write> nodes: array<Node>;
@group(0) @binding(1) var<uniform> params: Params;
@group(0) @binding(2) var<storage, read> snapshot: array<Node>;
@group(0) @binding(3) var<storage, read> links: array<Link>;
@group(0) @binding(4) var<storage, read_write> reduction: array<vec2<f32>>;

const TILE_SIZE: u32 = 256u;
const JIGGLE_SCALE: f32 = 1e-6;

// Same hash as the CPU jiggle: never returns exactly zero
fn jiggle(seed: u32) -> f32 {
    let s = (seed * 1103515245u + 12345u) & 0x7fffffffu;
    let v = (f32(s) / 2147483648.0 - 0.5) * JIGGLE_SCALE;
    if (v == 0.0) {
        return JIGGLE_SCALE * 0.25;
    }
    return v;
}

// Antisymmetric in (i, j): the lower index gets +v
fn pair_jiggle(i: u32, j: u32, axis: u32) -> f32 {
    let seed = min(i, j) * params.node_count + max(i, j) + axis;
    let v = jiggle(seed);
    if (i < j) {
        return v;
    }
    return -v;
}

// Any non-finite value means "not fixed"; test the exponent bits so the
// check survives compilers that assume NaN never occurs
fn is_fixed(v: f32) -> bool {
    return (bitcast<u32>(v) & 0x7f800000u) != 0x7f800000u;
}
"#;

/// Many-body force, tiled through workgroup memory
pub const MANY_BODY: &str = r#"
var<workgroup> tile: array<vec4<f32>, 256>;

@compute @workgroup_size(256)
fn many_body(
    @builtin(global_invocation_id) global_id: vec3<u32>,
    @builtin(local_invocation_id) local_id: vec3<u32>,
) {
    let i = global_id.x;
    let n = params.node_count;
    let valid = i < n;

    var pos = vec2<f32>(0.0, 0.0);
    if (valid) {
        pos = vec2<f32>(nodes[i].x, nodes[i].y);
    }
    var force = vec2<f32>(0.0, 0.0);

    let tile_count = (n + TILE_SIZE - 1u) / TILE_SIZE;
    for (var t = 0u; t < tile_count; t++) {
        // Each invocation stages exactly one slot
        let slot = t * TILE_SIZE + local_id.x;
        if (slot < n) {
            // Only fields no kernel writes this pass
            tile[local_id.x] = vec4<f32>(nodes[slot].x, nodes[slot].y, nodes[slot].strength, 0.0);
        } else {
            tile[local_id.x] = vec4<f32>(0.0);
        }
        workgroupBarrier();

        if (valid) {
            let tile_len = min(TILE_SIZE, n - t * TILE_SIZE);
            for (var k = 0u; k < tile_len; k++) {
                let j = t * TILE_SIZE + k;
                if (j == i) {
                    continue;
                }
                let other = tile[k];
                var dx = other.x - pos.x;
                var dy = other.y - pos.y;
                var l2 = dx * dx + dy * dy;
                if (l2 >= params.distance_max2) {
                    continue;
                }
                if (dx == 0.0) {
                    dx = pair_jiggle(i, j, 0u);
                    l2 = l2 + dx * dx;
                }
                if (dy == 0.0) {
                    dy = pair_jiggle(i, j, 1u);
                    l2 = l2 + dy * dy;
                }
                if (l2 < params.distance_min2) {
                    l2 = sqrt(params.distance_min2 * l2);
                }
                let w = other.z * params.alpha / l2;
                force = force + vec2<f32>(dx * w, dy * w);
            }
        }
        workgroupBarrier();
    }

    if (valid) {
        nodes[i].vx = nodes[i].vx + force.x;
        nodes[i].vy = nodes[i].vy + force.y;
    }
}
"#;

/// Link force: per-node gather over the link list, reading the snapshot
pub const LINK: &str = r#"
@compute @workgroup_size(256)
fn link_force(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    if (i >= params.node_count) {
        return;
    }

    var dv = vec2<f32>(0.0, 0.0);
    for (var k = 0u; k < params.link_count; k++) {
        let link = links[k];
        if (link.source != i && link.target_node != i) {
            continue;
        }
        let s = snapshot[link.source];
        let t = snapshot[link.target_node];
        var dx = t.x + t.vx - s.x - s.vx;
        var dy = t.y + t.vy - s.y - s.vy;
        if (dx == 0.0) {
            dx = jiggle(k * 2u);
        }
        if (dy == 0.0) {
            dy = jiggle(k * 2u + 1u);
        }
        let l = sqrt(dx * dx + dy * dy);
        let w = (l - link.distance) / l * params.alpha * link.strength;
        let fx = dx * w;
        let fy = dy * w;
        if (link.target_node == i) {
            dv = dv - vec2<f32>(fx * link.bias, fy * link.bias);
        }
        if (link.source == i) {
            dv = dv + vec2<f32>(fx * (1.0 - link.bias), fy * (1.0 - link.bias));
        }
    }

    nodes[i].vx = nodes[i].vx + dv.x;
    nodes[i].vy = nodes[i].vy + dv.y;
}
"#;

/// Collision force, tiled over predicted positions from the snapshot
pub const COLLIDE: &str = r#"
var<workgroup> tile: array<vec4<f32>, 256>;

@compute @workgroup_size(256)
fn collide(
    @builtin(global_invocation_id) global_id: vec3<u32>,
    @builtin(local_invocation_id) local_id: vec3<u32>,
) {
    let i = global_id.x;
    let n = params.node_count;
    let valid = i < n;

    var pos = vec2<f32>(0.0, 0.0);
    var r = 0.0;
    if (valid) {
        let me = snapshot[i];
        pos = vec2<f32>(me.x + me.vx, me.y + me.vy);
        r = me.radius;
    }
    var dv = vec2<f32>(0.0, 0.0);

    let tile_count = (n + TILE_SIZE - 1u) / TILE_SIZE;
    for (var t = 0u; t < tile_count; t++) {
        let slot = t * TILE_SIZE + local_id.x;
        if (slot < n) {
            let other = snapshot[slot];
            tile[local_id.x] = vec4<f32>(other.x + other.vx, other.y + other.vy, other.radius, 0.0);
        } else {
            tile[local_id.x] = vec4<f32>(0.0);
        }
        workgroupBarrier();

        if (valid) {
            let tile_len = min(TILE_SIZE, n - t * TILE_SIZE);
            for (var k = 0u; k < tile_len; k++) {
                let j = t * TILE_SIZE + k;
                if (j == i) {
                    continue;
                }
                let other = tile[k];
                let combined = r + other.z;
                var dx = pos.x - other.x;
                var dy = pos.y - other.y;
                var l2 = dx * dx + dy * dy;
                if (l2 >= combined * combined) {
                    continue;
                }
                if (dx == 0.0) {
                    dx = pair_jiggle(i, j, 0u);
                    l2 = l2 + dx * dx;
                }
                if (dy == 0.0) {
                    dy = pair_jiggle(i, j, 1u);
                    l2 = l2 + dy * dy;
                }
                let l = sqrt(l2);
                let impulse = (combined - l) * params.collision_strength * 0.5 * (other.z / combined);
                dv = dv + vec2<f32>(dx / l * impulse, dy / l * impulse);
            }
        }
        workgroupBarrier();
    }

    if (valid) {
        nodes[i].vx = nodes[i].vx + dv.x;
        nodes[i].vy = nodes[i].vy + dv.y;
    }
}
"#;

/// Axis positioning forces (two entry points)
pub const POSITION: &str = r#"
@compute @workgroup_size(256)
fn force_x(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    if (i >= params.node_count) {
        return;
    }
    nodes[i].vx = nodes[i].vx + (params.x_target - nodes[i].x) * params.x_strength * params.alpha;
}

@compute @workgroup_size(256)
fn force_y(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    if (i >= params.node_count) {
        return;
    }
    nodes[i].vy = nodes[i].vy + (params.y_target - nodes[i].y) * params.y_strength * params.alpha;
}
"#;

/// Radial positioning force
pub const RADIAL: &str = r#"
@compute @workgroup_size(256)
fn radial(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    if (i >= params.node_count) {
        return;
    }
    var dx = nodes[i].x - params.radial_x;
    var dy = nodes[i].y - params.radial_y;
    if (dx == 0.0) {
        dx = 1e-6;
    }
    if (dy == 0.0) {
        dy = 1e-6;
    }
    let r = sqrt(dx * dx + dy * dy);
    let k = (params.radial_radius - r) * params.radial_strength * params.alpha / r;
    nodes[i].vx = nodes[i].vx + dx * k;
    nodes[i].vy = nodes[i].vy + dy * k;
}
"#;

/// Centering: single-workgroup tree reduction of the mean, then a translation
pub const CENTER: &str = r#"
var<workgroup> partial: array<vec2<f32>, 256>;

@compute @workgroup_size(256)
fn center_reduce(@builtin(local_invocation_id) local_id: vec3<u32>) {
    let tid = local_id.x;
    let n = params.node_count;

    var sum = vec2<f32>(0.0, 0.0);
    for (var k = tid; k < n; k += TILE_SIZE) {
        sum = sum + vec2<f32>(nodes[k].x, nodes[k].y);
    }
    partial[tid] = sum;
    workgroupBarrier();

    for (var stride = TILE_SIZE / 2u; stride > 0u; stride = stride / 2u) {
        if (tid < stride) {
            partial[tid] = partial[tid] + partial[tid + stride];
        }
        workgroupBarrier();
    }

    if (tid == 0u) {
        reduction[0] = partial[0] / f32(max(n, 1u));
    }
}

@compute @workgroup_size(256)
fn center_apply(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    if (i >= params.node_count) {
        return;
    }
    let shift = (reduction[0] - vec2<f32>(params.center_x, params.center_y)) * params.center_strength;
    nodes[i].x = nodes[i].x - shift.x;
    nodes[i].y = nodes[i].y - shift.y;
}
"#;

/// Integration: damp velocity and move, or snap fixed axes
pub const INTEGRATE: &str = r#"
@compute @workgroup_size(256)
fn integrate(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    if (i >= params.node_count) {
        return;
    }
    var node = nodes[i];

    if (is_fixed(node.fx)) {
        node.x = node.fx;
        node.vx = 0.0;
    } else {
        node.vx = node.vx * params.velocity_decay;
        node.x = node.x + node.vx;
    }

    if (is_fixed(node.fy)) {
        node.y = node.fy;
        node.vy = 0.0;
    } else {
        node.vy = node.vy * params.velocity_decay;
        node.y = node.y + node.vy;
    }

    nodes[i] = node;
}
"#;

/// Full source for each shader module
pub struct ForceShaders {
    pub many_body: String,
    pub link: String,
    pub collide: String,
    pub position: String,
    pub radial: String,
    pub center: String,
    pub integrate: String,
}

impl ForceShaders {
    pub fn new() -> Self {
        let module = |body: &str| format!("{TYPES}\n{body}");
        Self {
            many_body: module(MANY_BODY),
            link: module(LINK),
            collide: module(COLLIDE),
            position: module(POSITION),
            radial: module(RADIAL),
            center: module(CENTER),
            integrate: module(INTEGRATE),
        }
    }
}

impl Default for ForceShaders {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_module_has_prelude() {
        let shaders = ForceShaders::new();
        for source in [
            &shaders.many_body,
            &shaders.link,
            &shaders.collide,
            &shaders.position,
            &shaders.radial,
            &shaders.center,
            &shaders.integrate,
        ] {
            assert!(source.starts_with(TYPES));
            assert!(source.contains("@compute @workgroup_size(256)"));
        }
    }

    #[test]
    fn test_tile_size_matches_workgroup() {
        assert!(TYPES.contains(&format!("TILE_SIZE: u32 = {WORKGROUP_SIZE}u")));
        assert!(MANY_BODY.contains(&format!("array<vec4<f32>, {WORKGROUP_SIZE}>")));
        assert!(COLLIDE.contains(&format!("array<vec4<f32>, {WORKGROUP_SIZE}>")));
    }

    #[test]
    fn test_tiled_kernels_barrier_twice_per_tile() {
        for kernel in [MANY_BODY, COLLIDE] {
            assert_eq!(kernel.matches("workgroupBarrier()").count(), 2);
            // Barriers must stay reachable by every invocation
            assert!(!kernel.contains("return;"));
        }
    }

    #[test]
    fn test_entry_points_present() {
        let shaders = ForceShaders::new();
        assert!(shaders.many_body.contains("fn many_body("));
        assert!(shaders.link.contains("fn link_force("));
        assert!(shaders.collide.contains("fn collide("));
        assert!(shaders.position.contains("fn force_x(") && shaders.position.contains("fn force_y("));
        assert!(shaders.radial.contains("fn radial("));
        assert!(shaders.center.contains("fn center_reduce(") && shaders.center.contains("fn center_apply("));
        assert!(shaders.integrate.contains("fn integrate("));
    }
}
