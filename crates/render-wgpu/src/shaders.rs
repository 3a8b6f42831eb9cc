/// WGSL shader for textured, distance-attenuated point sprites.
///
/// Each ring-buffer vertex is one instance; the six quad corners come from
/// `vertex_index`. Sprite size is a fraction of the viewport height.
pub const SPRITE_SHADER: &str = r#"
struct Uniforms {
    view_proj: mat4x4<f32>,
    eye: vec4<f32>,
    // size, min_size, aspect, alpha from texture (0 or 1)
    sprite: vec4<f32>,
    // attenuation a, b, c
    scale: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> uniforms: Uniforms;

@group(1) @binding(0)
var sprite_texture: texture_2d<f32>;
@group(1) @binding(1)
var sprite_sampler: sampler;

struct ParticleInput {
    @location(0) position: vec3<f32>,
    @location(1) color: vec4<f32>,
};

struct SpriteOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) color: vec4<f32>,
};

@vertex
fn vs_sprite(@builtin(vertex_index) corner_index: u32, particle: ParticleInput) -> SpriteOutput {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, 1.0),
    );
    let corner = corners[corner_index];

    let d = distance(uniforms.eye.xyz, particle.position);
    let denom = uniforms.scale.x + uniforms.scale.y * d + uniforms.scale.z * d * d;
    var size = uniforms.sprite.x;
    if (denom > 0.0) {
        size = size * sqrt(1.0 / denom);
    }
    size = max(size, uniforms.sprite.y);

    let clip = uniforms.view_proj * vec4<f32>(particle.position, 1.0);
    let half_extent = vec2<f32>(size / uniforms.sprite.z, size);

    var out: SpriteOutput;
    out.clip_position = clip + vec4<f32>(corner * half_extent * clip.w, 0.0, 0.0);
    out.uv = corner * vec2<f32>(0.5, -0.5) + vec2<f32>(0.5, 0.5);
    out.color = particle.color;
    return out;
}

@fragment
fn fs_sprite(in: SpriteOutput) -> @location(0) vec4<f32> {
    let texel = textureSample(sprite_texture, sprite_sampler, in.uv);
    let alpha = mix(in.color.a, texel.a, uniforms.sprite.w);
    return vec4<f32>(in.color.rgb * texel.rgb, alpha);
}
"#;
