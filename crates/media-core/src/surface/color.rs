//! Colour attachments for surfaces handed to the platform compositor.
//!
//! Each lookup prefers a named platform constant and falls back to the ISO/IEC 23001-8
//! code point. Values with neither are skipped.

use log::trace;
use media_types::{ColorPrimaries, ColorSpace, TransferFunction};

use super::{AttachmentMode, ColorKey, ColorTag, Surface, VideoFormat};

pub fn matrix_tag(space: ColorSpace) -> Option<ColorTag> {
    match space {
        ColorSpace::Bt601 => Some(ColorTag::Named("ITU_R_601_4")),
        ColorSpace::Bt709 => Some(ColorTag::Named("ITU_R_709_2")),
        ColorSpace::Bt2020 => Some(ColorTag::Named("ITU_R_2020")),
        ColorSpace::Smpte240 => Some(ColorTag::CodePoint(7)),
        ColorSpace::Undef => None,
    }
}

pub fn primaries_tag(primaries: ColorPrimaries) -> Option<ColorTag> {
    match primaries {
        ColorPrimaries::Bt2020 => Some(ColorTag::Named("ITU_R_2020")),
        ColorPrimaries::Bt709 => Some(ColorTag::Named("ITU_R_709_2")),
        ColorPrimaries::Smpte170 => Some(ColorTag::Named("SMPTE_C")),
        ColorPrimaries::Ebu3213 => Some(ColorTag::Named("EBU_3213")),
        ColorPrimaries::DciP3 => Some(ColorTag::CodePoint(11)),
        ColorPrimaries::Fcc1953 => Some(ColorTag::CodePoint(4)),
        ColorPrimaries::Undef => None,
    }
}

pub fn transfer_tag(transfer: TransferFunction) -> Option<ColorTag> {
    match transfer {
        TransferFunction::SmpteSt2084 => Some(ColorTag::Named("SMPTE_ST_2084_PQ")),
        // 709_2 is the preferred name for the BT.2020 curve too
        TransferFunction::Bt709 => Some(ColorTag::Named("ITU_R_709_2")),
        TransferFunction::Smpte240 => Some(ColorTag::Named("SMPTE_240M_1995")),
        TransferFunction::Hlg => Some(ColorTag::Named("ITU_R_2100_HLG")),
        TransferFunction::Linear => Some(ColorTag::Named("Linear")),
        TransferFunction::Srgb => Some(ColorTag::Named("UseGamma")),
        TransferFunction::Bt470Bg => Some(ColorTag::CodePoint(5)),
        TransferFunction::Bt470M => Some(ColorTag::CodePoint(4)),
        TransferFunction::Undef => None,
    }
}

pub fn gamma_tag(transfer: TransferFunction) -> Option<ColorTag> {
    match transfer {
        TransferFunction::Srgb => Some(ColorTag::Gamma(2.2)),
        _ => None,
    }
}

/// Attaches matrix, primaries, transfer function and gamma derived from `format` to every
/// key the surface does not carry yet. Returns the number of attachments set.
pub fn tag_color_properties(surface: &Surface, format: &VideoFormat) -> usize {
    let backend = surface.backend();
    let handle = surface.handle();

    let tags = [
        (ColorKey::YCbCrMatrix, matrix_tag(format.color_space)),
        (ColorKey::ColorPrimaries, primaries_tag(format.primaries)),
        (ColorKey::TransferFunction, transfer_tag(format.transfer)),
        (ColorKey::GammaLevel, gamma_tag(format.transfer)),
    ];

    let mut attached = 0;
    for (key, tag) in tags {
        if backend.has_attachment(handle, key) {
            continue;
        }
        if let Some(tag) = tag {
            trace!("tagging {:?} with {:?} = {:?}", surface, key, tag);
            backend.set_attachment(handle, key, tag, AttachmentMode::ShouldPropagate);
            attached += 1;
        }
    }
    attached
}
