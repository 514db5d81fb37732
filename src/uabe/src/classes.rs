//! Built-in class ids
//!
//! Names for the engine classes object summaries report. Ids not listed
//! here are shown numerically.

pub const GAME_OBJECT: i32 = 1;
pub const TRANSFORM: i32 = 4;
pub const MATERIAL: i32 = 21;
pub const TEXTURE_2D: i32 = 28;
pub const MESH: i32 = 43;
pub const SHADER: i32 = 48;
pub const TEXT_ASSET: i32 = 49;
pub const AUDIO_CLIP: i32 = 83;
pub const MONO_BEHAVIOUR: i32 = 114;
pub const MONO_SCRIPT: i32 = 115;
pub const FONT: i32 = 128;
pub const ASSET_BUNDLE: i32 = 142;
pub const SPRITE: i32 = 213;

const CLASSES: &[(i32, &str)] = &[
    (GAME_OBJECT, "GameObject"),
    (2, "Component"),
    (3, "LevelGameManager"),
    (TRANSFORM, "Transform"),
    (5, "TimeManager"),
    (8, "Behaviour"),
    (12, "ParticleAnimator"),
    (13, "InputManager"),
    (18, "EllipsoidParticleEmitter"),
    (20, "Camera"),
    (MATERIAL, "Material"),
    (23, "MeshRenderer"),
    (25, "Renderer"),
    (27, "Texture"),
    (TEXTURE_2D, "Texture2D"),
    (29, "OcclusionCullingSettings"),
    (30, "GraphicsSettings"),
    (33, "MeshFilter"),
    (41, "OcclusionPortal"),
    (MESH, "Mesh"),
    (45, "Skybox"),
    (47, "QualitySettings"),
    (SHADER, "Shader"),
    (TEXT_ASSET, "TextAsset"),
    (50, "Rigidbody2D"),
    (54, "Rigidbody"),
    (56, "Collider"),
    (57, "Joint"),
    (58, "CircleCollider2D"),
    (59, "HingeJoint"),
    (60, "PolygonCollider2D"),
    (61, "BoxCollider2D"),
    (62, "PhysicsMaterial2D"),
    (64, "MeshCollider"),
    (65, "BoxCollider"),
    (68, "EdgeCollider2D"),
    (72, "ComputeShader"),
    (74, "AnimationClip"),
    (81, "AudioListener"),
    (82, "AudioSource"),
    (AUDIO_CLIP, "AudioClip"),
    (84, "RenderTexture"),
    (86, "CustomRenderTexture"),
    (89, "Cubemap"),
    (90, "Avatar"),
    (91, "AnimatorController"),
    (93, "RuntimeAnimatorController"),
    (95, "Animator"),
    (96, "TrailRenderer"),
    (102, "TextMesh"),
    (104, "RenderSettings"),
    (108, "Light"),
    (111, "Animation"),
    (MONO_BEHAVIOUR, "MonoBehaviour"),
    (MONO_SCRIPT, "MonoScript"),
    (117, "Texture3D"),
    (119, "Projector"),
    (120, "LineRenderer"),
    (121, "Flare"),
    (124, "Halo"),
    (FONT, "Font"),
    (135, "SphereCollider"),
    (136, "CapsuleCollider"),
    (137, "SkinnedMeshRenderer"),
    (ASSET_BUNDLE, "AssetBundle"),
    (150, "PreloadData"),
    (152, "MovieTexture"),
    (154, "TerrainCollider"),
    (156, "TerrainData"),
    (157, "LightmapSettings"),
    (180, "OffMeshLink"),
    (184, "SubstanceArchive"),
    (187, "Texture2DArray"),
    (188, "CubemapArray"),
    (194, "NavMeshObstacle"),
    (195, "NavMeshAgent"),
    (198, "ParticleSystem"),
    (199, "ParticleSystemRenderer"),
    (200, "ShaderVariantCollection"),
    (205, "LODGroup"),
    (206, "BlendTree"),
    (207, "Motion"),
    (212, "SpriteRenderer"),
    (SPRITE, "Sprite"),
    (218, "Terrain"),
    (220, "LightProbeGroup"),
    (221, "AnimatorOverrideController"),
    (222, "CanvasRenderer"),
    (223, "Canvas"),
    (224, "RectTransform"),
    (225, "CanvasGroup"),
    (226, "BillboardAsset"),
    (228, "SpeedTreeWindAsset"),
    (236, "ClusterInputManager"),
    (238, "NavMeshData"),
    (240, "AudioMixer"),
    (241, "AudioMixerController"),
    (243, "AudioMixerGroupController"),
    (258, "LightProbes"),
    (271, "SampleClip"),
    (272, "AudioMixerSnapshot"),
    (273, "AudioMixerGroup"),
    (290, "AssetBundleManifest"),
    (319, "AvatarMask"),
    (320, "PlayableDirector"),
    (328, "VideoPlayer"),
    (329, "VideoClip"),
    (331, "SpriteMask"),
    (363, "OcclusionCullingData"),
    (687078895, "SpriteAtlas"),
];

/// Engine class name for `class_id`
pub fn name(class_id: i32) -> Option<&'static str> {
    CLASSES
        .iter()
        .find(|(id, _)| *id == class_id)
        .map(|(_, name)| *name)
}

/// Class id for an engine class name
pub fn id(name: &str) -> Option<i32> {
    CLASSES.iter().find(|(_, n)| *n == name).map(|(id, _)| *id)
}

/// Class name, or the id in decimal
pub fn display_name(class_id: i32) -> String {
    name(class_id).map_or_else(|| class_id.to_string(), str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(name(TEXTURE_2D), Some("Texture2D"));
        assert_eq!(name(MONO_BEHAVIOUR), Some("MonoBehaviour"));
        assert_eq!(id("AssetBundle"), Some(ASSET_BUNDLE));
        assert_eq!(display_name(1001), "1001");
        assert_eq!(display_name(49), "TextAsset");
    }
}
