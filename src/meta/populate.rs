//! Pushes core dimensions into a metadata store

use crate::errors::FormatResult;
use crate::pixels::get_zct_coords;
use crate::reader::CoreMetadata;
use super::store::{MetadataStore, StoreExt};

/// Records the Pixels block of series `series`
///
/// With `planes` set, every plane's Z, C and T coordinates are recorded too.
pub fn populate_pixels(
    store: &mut dyn MetadataStore,
    core: &CoreMetadata,
    series: usize,
    name: Option<&str>,
    planes: bool,
) -> FormatResult<()> {
    let image = format!("Image[{}]", series);
    let pixels = format!("{}/Pixels", image);
    if let Some(name) = name {
        store.set(&format!("{}/Name", image), name)?;
    }
    store.set(&format!("{}/DimensionOrder", pixels), core.dimension_order.as_str())?;
    store.set(&format!("{}/Type", pixels), core.pixel_type.name())?;
    store.set(&format!("{}/SizeX", pixels), core.size_x)?;
    store.set(&format!("{}/SizeY", pixels), core.size_y)?;
    store.set(&format!("{}/SizeZ", pixels), core.size_z)?;
    store.set(&format!("{}/SizeC", pixels), core.size_c)?;
    store.set(&format!("{}/SizeT", pixels), core.size_t)?;
    store.set(&format!("{}/BigEndian", pixels), !core.little_endian)?;
    store.set(&format!("{}/Interleaved", pixels), core.interleaved)?;
    store.set(&format!("{}/SignificantBits", pixels), core.bits_per_pixel)?;

    let samples = core.rgb_channel_count();
    for c in 0..core.effective_size_c() {
        store.set(&format!("{}/Channel[{}]/SamplesPerPixel", pixels, c), samples)?;
    }

    if planes {
        let order = &core.dimension_order;
        for no in 0..core.image_count {
            let [z, c, t] = get_zct_coords(order, core.zct_sizes(), no)?;
            let plane = format!("{}/Plane[{}]", pixels, no);
            store.set(&format!("{}/TheZ", plane), z)?;
            store.set(&format!("{}/TheC", plane), c)?;
            store.set(&format!("{}/TheT", plane), t)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::ome::OmeMetadata;
    use crate::meta::store::RetrieveExt;
    use crate::pixels::{DimensionOrder, PixelType};

    #[test]
    fn test_pixels_and_planes() {
        let core = CoreMetadata {
            size_x: 8,
            size_y: 4,
            size_z: 2,
            size_c: 3,
            size_t: 1,
            image_count: 6,
            dimension_order: DimensionOrder::parse("XYCZT").unwrap(),
            pixel_type: PixelType::Uint16,
            bits_per_pixel: 12,
            ..CoreMetadata::default()
        };
        let mut meta = OmeMetadata::new();
        populate_pixels(&mut meta, &core, 1, Some("stack"), true).unwrap();

        assert_eq!(meta.get_text("Image[1]/Name").as_deref(), Some("stack"));
        assert_eq!(meta.get_text("Image[1]/Pixels/Type").as_deref(), Some("uint16"));
        assert_eq!(meta.get_int("Image[1]/Pixels/SignificantBits"), Some(12));
        assert_eq!(meta.count("Image[1]/Pixels/Channel"), 3);
        assert_eq!(meta.count("Image[1]/Pixels/Plane"), 6);
        // XYCZT: plane 4 is c=1, z=1
        assert_eq!(meta.get_int("Image[1]/Pixels/Plane[4]/TheC"), Some(1));
        assert_eq!(meta.get_int("Image[1]/Pixels/Plane[4]/TheZ"), Some(1));
    }
}
