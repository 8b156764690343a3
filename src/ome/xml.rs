//! Minimal OME-XML (2016-06 schema) image descriptions.
//!
//! The description embedded in a converted OME-TIFF carries just enough
//! metadata for downstream viewers: instrument identity, acquisition
//! date, pixel geometry, and physical resolution. Every piece is
//! optional; elements whose source metadata is missing are omitted
//! rather than filled with placeholders.

use chrono::NaiveDateTime;

use crate::slide::SlideInfo;

/// Schema namespace for the 2016-06 OME data model.
pub const OME_SCHEMA_2016: &str = "http://www.openmicroscopy.org/Schemas/OME/2016-06";

// =============================================================================
// Image Info
// =============================================================================

/// Metadata feeding the OME-XML description of one image.
#[derive(Debug, Clone, Default)]
pub struct OmeImageInfo {
    /// Image name, conventionally the magnification such as "40x"
    pub name: Option<String>,

    /// Slide identifier, written quoted into the Description element
    pub description: Option<String>,

    /// ISO 8601 acquisition timestamp
    pub acquisition_date: Option<String>,

    /// Acquiring device model
    pub camera_model: Option<String>,

    /// Objective model
    pub objective_model: Option<String>,

    /// Objective magnification
    pub nominal_magnification: Option<f64>,

    /// Microns per pixel along X
    pub physical_size_x: Option<f64>,

    /// Microns per pixel along Y
    pub physical_size_y: Option<f64>,

    /// Image width in pixels
    pub size_x: u32,

    /// Image height in pixels
    pub size_y: u32,

    /// Number of channels
    pub size_c: u32,
}

impl OmeImageInfo {
    /// Build image info from a slide summary and the written region size.
    ///
    /// The region size rather than the slide size goes into the pixel
    /// geometry, since cropped conversions write only part of the slide.
    pub fn from_slide(info: &SlideInfo, width: u32, height: u32) -> Self {
        let acquisition_date = info
            .properties
            .get("Date")
            .zip(info.properties.get("Time"))
            .map(|(date, time)| format!("{} {}", date, time))
            .as_deref()
            .and_then(parse_scan_datetime);

        OmeImageInfo {
            name: info.objective_power.map(magnification_name),
            description: info.properties.get("Filename").cloned(),
            acquisition_date,
            camera_model: info.properties.get("ScanScope ID").cloned(),
            objective_model: None,
            nominal_magnification: info.objective_power,
            physical_size_x: info.mpp_x,
            physical_size_y: info.mpp_y,
            size_x: width,
            size_y: height,
            size_c: 3,
        }
    }

    fn has_instrument(&self) -> bool {
        self.camera_model.is_some() || self.has_objective()
    }

    fn has_objective(&self) -> bool {
        self.objective_model.is_some() || self.nominal_magnification.is_some()
    }
}

/// Format an objective power as an image name, e.g. `40x`.
fn magnification_name(power: f64) -> String {
    if power.fract() == 0.0 {
        format!("{:.0}x", power)
    } else {
        format!("{}x", power)
    }
}

/// Parse a scanner timestamp into ISO 8601.
///
/// Scanners disagree on date layouts, so known ones are tried in order:
/// day-first with a four-digit year, Aperio's month-first two-digit year,
/// then month-first with a four-digit year.
pub fn parse_scan_datetime(value: &str) -> Option<String> {
    const FORMATS: [&str; 3] = [
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
    ];

    FORMATS.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(value.trim(), fmt)
            .ok()
            .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
    })
}

// =============================================================================
// XML Building
// =============================================================================

/// Escape text for use in XML content or attribute values.
fn xml_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Build the OME-XML description for a single plane-separated uint8 image.
///
/// The document always contains the Image and Pixels skeleton with a
/// MetadataOnly marker (pixel data lives in the enclosing TIFF, not in
/// BinData). Instrument, date, and resolution appear only when known.
pub fn build_ome_xml(info: &OmeImageInfo) -> String {
    let mut xml = String::with_capacity(2048);

    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!(
        "<OME xmlns=\"{schema}\"\n    \
         xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" \
         xsi:schemaLocation=\"{schema} {schema}/ome.xsd\">\n",
        schema = OME_SCHEMA_2016
    ));

    if info.has_instrument() {
        xml.push_str("    <Instrument ID=\"Instrument:0\">\n");
        if let Some(camera) = &info.camera_model {
            xml.push_str(&format!(
                "        <Detector ID=\"Detector:0:0\" Model=\"{}\"/>\n",
                xml_escape(camera)
            ));
        }
        if info.has_objective() {
            xml.push_str("        <Objective ID=\"Objective:0:0\"");
            if let Some(model) = &info.objective_model {
                xml.push_str(&format!(" Model=\"{}\"", xml_escape(model)));
            }
            if let Some(mag) = info.nominal_magnification {
                xml.push_str(&format!(" NominalMagnification=\"{}\"", mag));
            }
            xml.push_str("/>\n");
        }
        xml.push_str("    </Instrument>\n");
    }

    xml.push_str("    <Image ID=\"Image:0\"");
    if let Some(name) = &info.name {
        xml.push_str(&format!(" Name=\"{}\"", xml_escape(name)));
    }
    xml.push_str(">\n");

    if let Some(date) = &info.acquisition_date {
        xml.push_str(&format!(
            "        <AcquisitionDate>{}</AcquisitionDate>\n",
            xml_escape(date)
        ));
    }
    if let Some(description) = &info.description {
        xml.push_str(&format!(
            "        <Description>\"{}\"</Description>\n",
            xml_escape(description)
        ));
    }
    if info.has_instrument() {
        xml.push_str("        <InstrumentRef ID=\"Instrument:0\"/>\n");
    }
    if info.has_objective() {
        xml.push_str("        <ObjectiveSettings ID=\"Objective:0:0\"/>\n");
    }

    xml.push_str("        <Pixels BigEndian=\"false\"\n");
    xml.push_str("                DimensionOrder=\"XYZCT\"\n");
    xml.push_str("                ID=\"Pixels:0\"\n");
    xml.push_str("                Interleaved=\"false\"\n");
    if let Some(mpp_x) = info.physical_size_x {
        xml.push_str(&format!(
            "                PhysicalSizeX=\"{}\"\n                PhysicalSizeXUnit=\"\u{b5}m\"\n",
            mpp_x
        ));
    }
    if let Some(mpp_y) = info.physical_size_y {
        xml.push_str(&format!(
            "                PhysicalSizeY=\"{}\"\n                PhysicalSizeYUnit=\"\u{b5}m\"\n",
            mpp_y
        ));
    }
    xml.push_str("                SignificantBits=\"8\"\n");
    xml.push_str(&format!("                SizeC=\"{}\"\n", info.size_c));
    xml.push_str("                SizeT=\"1\"\n");
    xml.push_str(&format!("                SizeX=\"{}\"\n", info.size_x));
    xml.push_str(&format!("                SizeY=\"{}\"\n", info.size_y));
    xml.push_str("                SizeZ=\"1\"\n");
    xml.push_str("                Type=\"uint8\">\n");

    for channel in 0..info.size_c {
        xml.push_str(&format!(
            "            <Channel ID=\"Channel:0:{}\" SamplesPerPixel=\"1\">\n                \
             <LightPath/>\n            </Channel>\n",
            channel
        ));
    }

    xml.push_str("            <MetadataOnly/>\n");
    xml.push_str("        </Pixels>\n");
    xml.push_str("    </Image>\n");
    xml.push_str("</OME>");

    xml
}

// =============================================================================
// Tests
// =============================================================================
