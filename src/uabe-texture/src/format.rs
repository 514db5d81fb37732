//! Engine texture format identifiers
//!
//! The numeric ids are the values stored in a Texture2D object's
//! `m_TextureFormat` field.

use std::fmt;

macro_rules! texture_formats {
    ($($name:ident = $id:literal),* $(,)?) => {
        /// Pixel format of a texture, keyed by the engine's numeric id
        #[allow(non_camel_case_types)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum TextureFormat {
            $($name,)*
            /// An id this crate does not know about
            Unknown(i32),
        }

        impl TextureFormat {
            /// Every known format, in id order
            pub const ALL: &'static [TextureFormat] = &[$(TextureFormat::$name,)*];

            pub fn from_id(id: i32) -> Self {
                match id {
                    $($id => TextureFormat::$name,)*
                    other => TextureFormat::Unknown(other),
                }
            }

            pub fn id(self) -> i32 {
                match self {
                    $(TextureFormat::$name => $id,)*
                    TextureFormat::Unknown(id) => id,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(TextureFormat::$name => stringify!($name),)*
                    TextureFormat::Unknown(_) => "Unknown",
                }
            }

            /// Look up a format by its engine name (case-insensitive)
            pub fn from_name(name: &str) -> Option<Self> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|f| f.name().eq_ignore_ascii_case(name))
            }
        }
    };
}

texture_formats! {
    Alpha8 = 1,
    ARGB4444 = 2,
    RGB24 = 3,
    RGBA32 = 4,
    ARGB32 = 5,
    RGB565 = 7,
    R16 = 9,
    DXT1 = 10,
    DXT5 = 12,
    RGBA4444 = 13,
    BGRA32 = 14,
    RHalf = 15,
    RGHalf = 16,
    RGBAHalf = 17,
    RFloat = 18,
    RGFloat = 19,
    RGBAFloat = 20,
    YUY2 = 21,
    RGB9e5Float = 22,
    BC6H = 24,
    BC7 = 25,
    BC4 = 26,
    BC5 = 27,
    DXT1Crunched = 28,
    DXT5Crunched = 29,
    PVRTC_RGB2 = 30,
    PVRTC_RGBA2 = 31,
    PVRTC_RGB4 = 32,
    PVRTC_RGBA4 = 33,
    ETC_RGB4 = 34,
    ATC_RGB4 = 35,
    ATC_RGBA8 = 36,
    EAC_R = 41,
    EAC_R_SIGNED = 42,
    EAC_RG = 43,
    EAC_RG_SIGNED = 44,
    ETC2_RGB = 45,
    ETC2_RGBA1 = 46,
    ETC2_RGBA8 = 47,
    ASTC_RGB_4x4 = 48,
    ASTC_RGB_5x5 = 49,
    ASTC_RGB_6x6 = 50,
    ASTC_RGB_8x8 = 51,
    ASTC_RGB_10x10 = 52,
    ASTC_RGB_12x12 = 53,
    ASTC_RGBA_4x4 = 54,
    ASTC_RGBA_5x5 = 55,
    ASTC_RGBA_6x6 = 56,
    ASTC_RGBA_8x8 = 57,
    ASTC_RGBA_10x10 = 58,
    ASTC_RGBA_12x12 = 59,
    ETC_RGB4_3DS = 60,
    ETC_RGBA8_3DS = 61,
    RG16 = 62,
    R8 = 63,
    ETC_RGB4Crunched = 64,
    ETC2_RGBA8Crunched = 65,
    ASTC_HDR_4x4 = 66,
    ASTC_HDR_5x5 = 67,
    ASTC_HDR_6x6 = 68,
    ASTC_HDR_8x8 = 69,
    ASTC_HDR_10x10 = 70,
    ASTC_HDR_12x12 = 71,
    RG32 = 72,
    RGB48 = 73,
    RGBA64 = 74,
}

impl TextureFormat {
    /// ASTC block edge length, if this is an ASTC format
    pub fn astc_block(self) -> Option<u32> {
        use TextureFormat::*;
        match self {
            ASTC_RGB_4x4 | ASTC_RGBA_4x4 | ASTC_HDR_4x4 => Some(4),
            ASTC_RGB_5x5 | ASTC_RGBA_5x5 | ASTC_HDR_5x5 => Some(5),
            ASTC_RGB_6x6 | ASTC_RGBA_6x6 | ASTC_HDR_6x6 => Some(6),
            ASTC_RGB_8x8 | ASTC_RGBA_8x8 | ASTC_HDR_8x8 => Some(8),
            ASTC_RGB_10x10 | ASTC_RGBA_10x10 | ASTC_HDR_10x10 => Some(10),
            ASTC_RGB_12x12 | ASTC_RGBA_12x12 | ASTC_HDR_12x12 => Some(12),
            _ => None,
        }
    }

    /// Crunched formats carry a whole compressed mip chain and cannot be
    /// sliced per level
    pub fn is_crunched(self) -> bool {
        matches!(
            self,
            TextureFormat::DXT1Crunched
                | TextureFormat::DXT5Crunched
                | TextureFormat::ETC_RGB4Crunched
                | TextureFormat::ETC2_RGBA8Crunched
        )
    }

    /// Whether the format keeps an alpha channel
    pub fn has_alpha(self) -> bool {
        use TextureFormat::*;
        matches!(
            self,
            Alpha8
                | ARGB4444
                | RGBA32
                | ARGB32
                | DXT5
                | RGBA4444
                | BGRA32
                | RGBAHalf
                | RGBAFloat
                | BC7
                | DXT5Crunched
                | PVRTC_RGBA2
                | PVRTC_RGBA4
                | ATC_RGBA8
                | ETC2_RGBA1
                | ETC2_RGBA8
                | ASTC_RGBA_4x4
                | ASTC_RGBA_5x5
                | ASTC_RGBA_6x6
                | ASTC_RGBA_8x8
                | ASTC_RGBA_10x10
                | ASTC_RGBA_12x12
                | ETC_RGBA8_3DS
                | ETC2_RGBA8Crunched
                | RGBA64
        )
    }
}

impl fmt::Display for TextureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextureFormat::Unknown(id) => write!(f, "Unknown({})", id),
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_roundtrip() {
        for &format in TextureFormat::ALL {
            assert_eq!(TextureFormat::from_id(format.id()), format);
        }
    }

    #[test]
    fn test_has_alpha() {
        assert!(TextureFormat::DXT5.has_alpha());
        assert!(TextureFormat::ASTC_RGBA_8x8.has_alpha());
        assert!(TextureFormat::Alpha8.has_alpha());
        assert!(!TextureFormat::DXT1.has_alpha());
        assert!(!TextureFormat::ASTC_RGB_8x8.has_alpha());
        assert!(!TextureFormat::RGB24.has_alpha());
    }

    #[test]
    fn test_unknown_id() {
        assert_eq!(TextureFormat::from_id(6), TextureFormat::Unknown(6));
        assert_eq!(TextureFormat::Unknown(6).id(), 6);
        assert_eq!(TextureFormat::Unknown(6).to_string(), "Unknown(6)");
    }

    #[test]
    fn test_from_name() {
        assert_eq!(TextureFormat::from_name("dxt5"), Some(TextureFormat::DXT5));
        assert_eq!(
            TextureFormat::from_name("ASTC_RGBA_6x6"),
            Some(TextureFormat::ASTC_RGBA_6x6)
        );
        assert_eq!(TextureFormat::from_name("PF_BC7"), None);
    }

    #[test]
    fn test_astc_block() {
        assert_eq!(TextureFormat::ASTC_RGB_10x10.astc_block(), Some(10));
        assert_eq!(TextureFormat::ASTC_HDR_4x4.astc_block(), Some(4));
        assert_eq!(TextureFormat::BC7.astc_block(), None);
    }
}
