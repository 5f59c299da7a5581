//! TIFF field type codes and the well-known tag name table.

/// TIFF data type codes, per the baseline TIFF 6.0 spec plus the BigTIFF
/// `Long8` extension. Unknown codes are handled by callers via
/// [`FieldType::from_u16`] returning `None` — the entry is still recorded,
/// read with a conservative 1-byte element size, and never interpreted
/// (§4.1 robustness rule, §7 `UnsupportedType`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Byte = 1,
    Ascii = 2,
    Short = 3,
    Long = 4,
    Rational = 5,
    SByte = 6,
    Undefined = 7,
    SShort = 8,
    SLong = 9,
    SRational = 10,
    Float = 11,
    Double = 12,
    Long8 = 16,
}

impl FieldType {
    pub fn from_u16(code: u16) -> Option<Self> {
        Some(match code {
            1 => FieldType::Byte,
            2 => FieldType::Ascii,
            3 => FieldType::Short,
            4 => FieldType::Long,
            5 => FieldType::Rational,
            6 => FieldType::SByte,
            7 => FieldType::Undefined,
            8 => FieldType::SShort,
            9 => FieldType::SLong,
            10 => FieldType::SRational,
            11 => FieldType::Float,
            12 => FieldType::Double,
            16 => FieldType::Long8,
            _ => return None,
        })
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Size in bytes of a single element of this type.
    pub fn size_in_bytes(self) -> u64 {
        match self {
            FieldType::Byte | FieldType::Ascii | FieldType::SByte | FieldType::Undefined => 1,
            FieldType::Short | FieldType::SShort => 2,
            FieldType::Long | FieldType::SLong | FieldType::Float => 4,
            FieldType::Rational | FieldType::SRational | FieldType::Double | FieldType::Long8 => {
                8
            }
        }
    }
}

/// Element size in bytes for a (possibly unknown) field type code.
/// Unknown codes fall back to 1 byte per §4.1.
pub fn element_size(code: u16) -> u64 {
    FieldType::from_u16(code)
        .map(FieldType::size_in_bytes)
        .unwrap_or(1)
}

/// Well-known TIFF tags used throughout the format handlers. Private vendor
/// ranges (e.g. NDPI 65420-65480) are named in their own handler module.
pub const TAG_NEW_SUBFILE_TYPE: u16 = 254;
pub const TAG_IMAGE_WIDTH: u16 = 256;
pub const TAG_IMAGE_LENGTH: u16 = 257;
pub const TAG_BITS_PER_SAMPLE: u16 = 258;
pub const TAG_COMPRESSION: u16 = 259;
pub const TAG_PHOTOMETRIC_INTERPRETATION: u16 = 262;
pub const TAG_IMAGE_DESCRIPTION: u16 = 270;
pub const TAG_MAKE: u16 = 271;
pub const TAG_MODEL: u16 = 272;
pub const TAG_STRIP_OFFSETS: u16 = 273;
pub const TAG_ROWS_PER_STRIP: u16 = 278;
pub const TAG_STRIP_BYTE_COUNTS: u16 = 279;
pub const TAG_X_RESOLUTION: u16 = 282;
pub const TAG_Y_RESOLUTION: u16 = 283;
pub const TAG_RESOLUTION_UNIT: u16 = 296;
pub const TAG_SOFTWARE: u16 = 305;
pub const TAG_DATE_TIME: u16 = 306;
pub const TAG_ARTIST: u16 = 315;
pub const TAG_HOST_COMPUTER: u16 = 316;
pub const TAG_TILE_WIDTH: u16 = 322;
pub const TAG_TILE_LENGTH: u16 = 323;
pub const TAG_TILE_OFFSETS: u16 = 324;
pub const TAG_TILE_BYTE_COUNTS: u16 = 325;
pub const TAG_SUB_IFDS: u16 = 330;
pub const TAG_JPEG_TABLES: u16 = 347;
pub const TAG_XMP: u16 = 700;
pub const TAG_COPYRIGHT: u16 = 33432;
pub const TAG_IPTC: u16 = 33723;
pub const TAG_EXIF_IFD: u16 = 34665;
pub const TAG_ICC_PROFILE: u16 = 34675;
pub const TAG_GPS_IFD: u16 = 34853;
pub const TAG_YCBCR_SUBSAMPLING: u16 = 530;
pub const TAG_DATE_TIME_ORIGINAL: u16 = 36867;
pub const TAG_DATE_TIME_DIGITIZED: u16 = 36868;
pub const TAG_USER_COMMENT: u16 = 37510;
pub const TAG_IMAGE_UNIQUE_ID: u16 = 42016;

/// Returns the human-readable name for a well-known tag, or a generic
/// `Tag_<id>` fallback.
pub fn tag_name(tag_id: u16) -> String {
    let name = match tag_id {
        254 => "NewSubfileType",
        256 => "ImageWidth",
        257 => "ImageLength",
        258 => "BitsPerSample",
        259 => "Compression",
        262 => "PhotometricInterpretation",
        270 => "ImageDescription",
        271 => "Make",
        272 => "Model",
        273 => "StripOffsets",
        278 => "RowsPerStrip",
        279 => "StripByteCounts",
        282 => "XResolution",
        283 => "YResolution",
        296 => "ResolutionUnit",
        305 => "Software",
        306 => "DateTime",
        315 => "Artist",
        316 => "HostComputer",
        322 => "TileWidth",
        323 => "TileLength",
        324 => "TileOffsets",
        325 => "TileByteCounts",
        330 => "SubIFDs",
        347 => "JPEGTables",
        530 => "YCbCrSubSampling",
        700 => "XMP",
        33432 => "Copyright",
        33723 => "IPTC",
        34665 => "ExifIFD",
        34675 => "ICCProfile",
        34853 => "GPSIFD",
        36867 => "DateTimeOriginal",
        36868 => "DateTimeDigitized",
        37510 => "UserComment",
        42016 => "ImageUniqueID",
        65420 => "NDPI_FormatFlag",
        65421 => "NDPI_SourceLens",
        65422 => "NDPI_XOffset",
        65423 => "NDPI_YOffset",
        65424 => "NDPI_ZOffset",
        65426 => "NDPI_JpegQuality",
        65427 => "NDPI_Reference",
        65428 => "NDPI_ImgSize",
        65439 => "NDPI_FocusPoints",
        65442 => "NDPI_SerialNumber",
        65449 => "NDPI_ScannerProps",
        65468 => "NDPI_BarCode",
        65477 => "NDPI_ScanProfile",
        65480 => "NDPI_BarCodeType",
        other => return format!("Tag_{other}"),
    };
    name.to_string()
}

/// The "extra metadata" tag set shared by the base TIFF handler (§4.4 step 2).
pub const EXTRA_METADATA_TAGS: &[u16] = &[
    TAG_SOFTWARE,
    TAG_ARTIST,
    TAG_HOST_COMPUTER,
    TAG_XMP,
    TAG_COPYRIGHT,
    TAG_IPTC,
    TAG_ICC_PROFILE,
    TAG_USER_COMMENT,
    TAG_IMAGE_UNIQUE_ID,
];

/// DateTime-family tags swept on every TIFF-family handler (§4.4 step 1).
pub const DATE_TIME_TAGS: &[u16] = &[TAG_DATE_TIME, TAG_DATE_TIME_ORIGINAL, TAG_DATE_TIME_DIGITIZED];
