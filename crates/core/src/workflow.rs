//! Z-Image Turbo workflow construction.
//!
//! [`build_graph`] always emits the base text-to-image chain, then runs the
//! optional [`STAGES`] in order. Each stage receives the graph and the link
//! to the current image and hands back both, possibly extended; the last
//! image link feeds the terminal `SaveImage` node.

use serde_json::json;

use crate::graph::{ComputationGraph, EdgeRef, NodeInputs, NodeRef};
use crate::request::GenerationRequest;

// ---------------------------------------------------------------------------
// Node classes
// ---------------------------------------------------------------------------

pub mod class {
    pub const UNET_LOADER: &str = "UNETLoader";
    pub const CLIP_LOADER: &str = "CLIPLoader";
    pub const VAE_LOADER: &str = "VAELoader";
    pub const LORA_LOADER: &str = "LoraLoader";
    pub const TEXT_ENCODE: &str = "CLIPTextEncode";
    pub const EMPTY_LATENT: &str = "EmptyFlux2LatentImage";
    pub const SAMPLER: &str = "KSampler";
    pub const VAE_DECODE: &str = "VAEDecode";
    pub const VAE_ENCODE: &str = "VAEEncode";
    pub const UPSCALE_IMAGE: &str = "CR Upscale Image";
    pub const BBOX_DETECTOR: &str = "UltralyticsDetectorProvider";
    pub const SAM_LOADER: &str = "SAMLoader";
    pub const FACE_DETAILER: &str = "FaceDetailer";
    pub const POST_PROCESS: &str = "CRT Post-Process Suite";
    pub const SAVE_IMAGE: &str = "SaveImage";
}

// ---------------------------------------------------------------------------
// Models and fixed sampler settings
// ---------------------------------------------------------------------------

pub const UNET_MODEL: &str = "z_image_turbo_bf16.safetensors";
pub const CLIP_MODEL: &str = "qwen_3_4b.safetensors";
pub const CLIP_TYPE: &str = "lumina2";
pub const VAE_MODEL: &str = "ae.safetensors";
/// Loaded at zero strength when the caller picks no style modifier.
pub const DEFAULT_LORA: &str = "V8-zimage.safetensors";
pub const UPSCALE_MODEL: &str = "4x_foolhardy_Remacri.pth";
pub const FACE_DETECTOR_MODEL: &str = "bbox/face_yolov8m.pt";
pub const SAM_MODEL: &str = "sam_vit_b_01ec64.pth";
pub const SAVE_PREFIX: &str = "AIEGO";

pub const BASE_STEPS: u32 = 9;
pub const REFINE_STEPS: u32 = 4;
pub const UPSCALE_DENOISE: f64 = 0.41;
pub const FACE_DETAIL_DENOISE: f64 = 0.45;

pub const MIN_DIMENSION: u32 = 512;
pub const MAX_DIMENSION: u32 = 2048;
/// Latent sizes must be multiples of this.
pub const DIMENSION_ALIGNMENT: u32 = 8;

/// Nodes present in every graph, including the terminal save node.
pub const BASE_NODE_COUNT: usize = 10;
pub const UPSCALE_NODE_COUNT: usize = 4;
pub const FACE_DETAIL_NODE_COUNT: usize = 3;
pub const POST_PROCESS_NODE_COUNT: usize = 1;

/// Round to the nearest multiple of [`DIMENSION_ALIGNMENT`], then clamp to
/// `[MIN_DIMENSION, MAX_DIMENSION]`.
///
/// Both bounds are themselves aligned, so the result is always aligned.
pub fn normalize_dimension(requested: i64) -> u32 {
    let step = DIMENSION_ALIGNMENT as f64;
    let aligned = (requested as f64 / step).round() * step;
    aligned.clamp(MIN_DIMENSION as f64, MAX_DIMENSION as f64) as u32
}

/// Handles to the base nodes that optional stages wire into.
#[derive(Debug, Clone)]
pub struct BaseNodes {
    pub unet: NodeRef,
    pub vae: NodeRef,
    pub lora: NodeRef,
    pub positive: NodeRef,
    pub negative: NodeRef,
    pub latent: NodeRef,
    pub sampler: NodeRef,
    pub decode: NodeRef,
}

/// Read-only inputs shared by every stage.
pub struct StageContext<'a> {
    pub request: &'a GenerationRequest,
    pub base: &'a BaseNodes,
}

/// A pipeline step: `(graph, current image) -> (graph, current image)`.
/// Disabled stages return their inputs untouched.
pub type Stage = fn(&StageContext<'_>, ComputationGraph, EdgeRef) -> (ComputationGraph, EdgeRef);

/// Optional stages in application order.
pub const STAGES: [(&str, Stage); 3] = [
    ("upscale", upscale_stage),
    ("face_detail", face_detail_stage),
    ("post_process", post_process_stage),
];

/// Build the complete workflow for `request`.
pub fn build_graph(request: &GenerationRequest) -> ComputationGraph {
    let (graph, base) = base_graph(request);
    let ctx = StageContext {
        request,
        base: &base,
    };

    let (mut graph, image) = STAGES
        .iter()
        .fold((graph, base.decode.output(0)), |(graph, image), (_, stage)| {
            stage(&ctx, graph, image)
        });

    graph.add_node(
        class::SAVE_IMAGE,
        NodeInputs::new()
            .value("filename_prefix", SAVE_PREFIX)
            .link("images", image),
    );
    graph
}

/// Loaders, LoRA, prompt encoders, latent, sampler and decode.
pub fn base_graph(request: &GenerationRequest) -> (ComputationGraph, BaseNodes) {
    let mut graph = ComputationGraph::new();

    let unet = graph.add_node(
        class::UNET_LOADER,
        NodeInputs::new()
            .value("unet_name", UNET_MODEL)
            .value("weight_dtype", "default"),
    );
    let clip = graph.add_node(
        class::CLIP_LOADER,
        NodeInputs::new()
            .value("clip_name", CLIP_MODEL)
            .value("type", CLIP_TYPE)
            .value("device", "default"),
    );
    let vae = graph.add_node(
        class::VAE_LOADER,
        NodeInputs::new().value("vae_name", VAE_MODEL),
    );

    let (lora_name, strength) = match &request.style {
        Some(style) => (style.name.as_str(), style.strength),
        None => (DEFAULT_LORA, 0.0),
    };
    let lora = graph.add_node(
        class::LORA_LOADER,
        NodeInputs::new()
            .value("lora_name", lora_name)
            .value("strength_model", strength)
            .value("strength_clip", 1)
            .link("model", unet.output(0))
            .link("clip", clip.output(0)),
    );

    let positive = graph.add_node(
        class::TEXT_ENCODE,
        NodeInputs::new()
            .value("text", request.prompt.as_str())
            .link("clip", lora.output(1)),
    );
    let negative = graph.add_node(
        class::TEXT_ENCODE,
        NodeInputs::new()
            .value("text", request.negative.as_str())
            .link("clip", lora.output(1)),
    );

    let latent = graph.add_node(
        class::EMPTY_LATENT,
        NodeInputs::new()
            .value("width", normalize_dimension(request.width))
            .value("height", normalize_dimension(request.height))
            .value("batch_size", 1),
    );

    let sampler = graph.add_node(
        class::SAMPLER,
        NodeInputs::new()
            .values(json!({
                "seed": request.seed,
                "steps": BASE_STEPS,
                "cfg": 1,
                "sampler_name": "euler",
                "scheduler": "simple",
                "denoise": 1,
            }))
            .link("model", lora.output(0))
            .link("positive", positive.output(0))
            .link("negative", negative.output(0))
            .link("latent_image", latent.output(0)),
    );
    let decode = graph.add_node(
        class::VAE_DECODE,
        NodeInputs::new()
            .link("samples", sampler.output(0))
            .link("vae", vae.output(0)),
    );

    let base = BaseNodes {
        unet,
        vae,
        lora,
        positive,
        negative,
        latent,
        sampler,
        decode,
    };
    (graph, base)
}

/// Pixel upscale, re-encode, and a short low-denoise refine pass on the
/// raw UNET model.
pub fn upscale_stage(
    ctx: &StageContext<'_>,
    mut graph: ComputationGraph,
    image: EdgeRef,
) -> (ComputationGraph, EdgeRef) {
    let upscale = ctx.request.upscale;
    if !upscale.enabled {
        return (graph, image);
    }
    let base = ctx.base;

    let upscaled = graph.add_node(
        class::UPSCALE_IMAGE,
        NodeInputs::new()
            .values(json!({
                "upscale_model": UPSCALE_MODEL,
                "mode": "rescale",
                "rescale_factor": upscale.factor,
                "resize_width": 1024,
                "resampling_method": "bilinear",
                "supersample": "false",
                "rounding_modulus": DIMENSION_ALIGNMENT,
            }))
            .link("image", image),
    );
    let encoded = graph.add_node(
        class::VAE_ENCODE,
        NodeInputs::new()
            .link("pixels", upscaled.output(0))
            .link("vae", base.vae.output(0)),
    );
    let refined = graph.add_node(
        class::SAMPLER,
        NodeInputs::new()
            .values(json!({
                "seed": ctx.request.seed.wrapping_add(1),
                "steps": REFINE_STEPS,
                "cfg": 1,
                "sampler_name": "euler",
                "scheduler": "simple",
                "denoise": UPSCALE_DENOISE,
            }))
            .link("model", base.unet.output(0))
            .link("positive", base.positive.output(0))
            .link("negative", base.negative.output(0))
            .link("latent_image", encoded.output(0)),
    );
    let decoded = graph.add_node(
        class::VAE_DECODE,
        NodeInputs::new()
            .link("samples", refined.output(0))
            .link("vae", base.vae.output(0)),
    );

    (graph, decoded.output(0))
}

/// Face detection plus an inpainting detail pass over each detected face.
pub fn face_detail_stage(
    ctx: &StageContext<'_>,
    mut graph: ComputationGraph,
    image: EdgeRef,
) -> (ComputationGraph, EdgeRef) {
    if !ctx.request.face_detailer {
        return (graph, image);
    }
    let base = ctx.base;

    let detector = graph.add_node(
        class::BBOX_DETECTOR,
        NodeInputs::new().value("model_name", FACE_DETECTOR_MODEL),
    );
    let sam = graph.add_node(
        class::SAM_LOADER,
        NodeInputs::new()
            .value("model_name", SAM_MODEL)
            .value("device_mode", "Prefer GPU"),
    );
    let detailer = graph.add_node(
        class::FACE_DETAILER,
        NodeInputs::new()
            .values(json!({
                "guide_size": 1024,
                "guide_size_for": false,
                "max_size": 1024,
                "seed": ctx.request.seed.wrapping_add(2),
                "steps": REFINE_STEPS,
                "cfg": 1,
                "sampler_name": "dpmpp_2m",
                "scheduler": "simple",
                "denoise": FACE_DETAIL_DENOISE,
                "feather": 5,
                "noise_mask": true,
                "force_inpaint": true,
                "bbox_threshold": 0.5,
                "bbox_dilation": 10,
                "bbox_crop_factor": 3,
                "sam_detection_hint": "center-1",
                "sam_dilation": 0,
                "sam_threshold": 0.93,
                "sam_bbox_expansion": 0,
                "sam_mask_hint_threshold": 0.7,
                "sam_mask_hint_use_negative": "False",
                "drop_size": 10,
                "wildcard": "",
                "cycle": 1,
                "inpaint_model": false,
                "noise_mask_feather": 20,
                "tiled_encode": false,
                "tiled_decode": false,
            }))
            .link("image", image)
            .link("model", base.lora.output(0))
            .link("clip", base.lora.output(1))
            .link("vae", base.vae.output(0))
            .link("positive", base.positive.output(0))
            .link("negative", base.negative.output(0))
            .link("bbox_detector", detector.output(0))
            .link("sam_model_opt", sam.output(0)),
    );

    (graph, detailer.output(0))
}

/// Single post-processing node; each effect group is switched on only when
/// its parameters leave the neutral value.
pub fn post_process_stage(
    ctx: &StageContext<'_>,
    mut graph: ComputationGraph,
    image: EdgeRef,
) -> (ComputationGraph, EdgeRef) {
    let pp = &ctx.request.post;
    if pp.is_neutral() {
        return (graph, image);
    }

    let node = graph.add_node(
        class::POST_PROCESS,
        NodeInputs::new()
            .link("image", image)
            .values(json!({
                "enable_upscale": false,
                "upscale_model_path": "4x-ClearRealityV1_Soft.pth",
                "downscale_by": 1,
                "rescale_method": "lanczos",
                "precision": "auto",
                "batch_size": 1,
                "gamma": 1,
                "brightness": 0,
                "postprocess_ui": "",
            }))
            .values(json!({
                "enable_levels": pp.levels_enabled(),
                "exposure": pp.exposure,
                "contrast": pp.contrast,
                "saturation": pp.saturation,
                "vibrance": pp.vibrance,
            }))
            .values(json!({
                "enable_color_wheels": false,
                "lift_r": 0, "lift_g": 0, "lift_b": 0,
                "gamma_r": 1, "gamma_g": 1, "gamma_b": 1,
                "gain_r": 1, "gain_g": 1, "gain_b": 1,
            }))
            .values(json!({
                "enable_temp_tint": pp.temp_tint_enabled(),
                "temperature": pp.temperature,
                "tint": pp.tint,
            }))
            .values(json!({
                "enable_sharpen": pp.sharpen_enabled(),
                "sharpen_strength": pp.sharpness,
                "sharpen_radius": 1.85,
                "sharpen_threshold": 0.015,
            }))
            .values(json!({
                "enable_vignette": pp.vignette_enabled(),
                "vignette_strength": pp.vignette,
                "vignette_radius": 0.7,
                "vignette_softness": 2,
            }))
            .values(json!({
                "enable_film_grain": pp.grain_enabled(),
                "grain_intensity": pp.grain_amount,
                "grain_size": pp.grain_size,
                "grain_color_amount": 0.044,
            }))
            .values(json!({
                "enable_small_glow": false,
                "small_glow_intensity": 0.1,
                "small_glow_radius": 0.1,
                "small_glow_threshold": 0.25,
                "enable_large_glow": false,
                "large_glow_intensity": 0.25,
                "large_glow_radius": 50,
                "large_glow_threshold": 0.3,
            }))
            .values(json!({
                "enable_glare": false,
                "glare_type": "star_4",
                "glare_intensity": 0.65,
                "glare_length": 1.5,
                "glare_angle": 0,
                "glare_threshold": 0.95,
                "glare_quality": 16,
                "glare_ray_width": 1,
            }))
            .values(json!({
                "enable_chromatic_aberration": false,
                "ca_strength": 0.005,
                "ca_edge_falloff": 2,
                "enable_ca_hue_shift": false,
                "ca_hue_shift_degrees": 0,
            }))
            .values(json!({
                "enable_radial_blur": false,
                "radial_blur_type": "spin",
                "radial_blur_strength": 0,
                "radial_blur_center_x": 0.5,
                "radial_blur_center_y": 0.25,
                "radial_blur_falloff": 0.05,
                "radial_blur_samples": 16,
            }))
            .values(json!({
                "enable_lens_distortion": false,
                "barrel_distortion": 0,
            })),
    );

    (graph, node.output(0))
}
