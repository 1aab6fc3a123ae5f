//! XDMF time collection pointing into a sorted store; no particle data is copied.
//!
//! Each timestep selects its row of the 2D datasets with an HDF hyperslab.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use track_core::{Axis, DType, TrackError, TrackResult};

use crate::sorted::SortedStore;
use crate::TrackSource;

fn number_type(dtype: DType) -> (&'static str, usize) {
    match dtype {
        DType::U64 => ("UInt", 8),
        DType::I16 => ("Int", 2),
        DType::F64 => ("Float", 8),
    }
}

/// Row `row` of the `ntimes x npoints` dataset `name` in `filename`.
#[allow(clippy::too_many_arguments)]
fn write_hyperslab<W: Write>(
    out: &mut W,
    indent: &str,
    filename: &str,
    name: &str,
    (kind, precision): (&str, usize),
    row: usize,
    ntimes: usize,
    npoints: usize,
) -> TrackResult<()> {
    writeln!(
        out,
        "{indent}<DataItem ItemType=\"HyperSlab\" Dimensions=\"{npoints}\" Type=\"HyperSlab\">"
    )?;
    writeln!(
        out,
        "{indent}\t<DataItem Dimensions=\"3 2\" Format=\"XML\">{row} 0 1 1 1 {npoints}</DataItem>"
    )?;
    writeln!(
        out,
        "{indent}\t<DataItem Dimensions=\"{ntimes} {npoints}\" NumberType=\"{kind}\" Precision=\"{precision}\" Format=\"HDF\">{filename}:/{name}</DataItem>"
    )?;
    writeln!(out, "{indent}</DataItem>")?;
    Ok(())
}

fn attribute_name(axis: Axis) -> &'static str {
    match axis {
        Axis::Id => "Id",
        Axis::Px => "Px",
        Axis::Py => "Py",
        Axis::Pz => "Pz",
        Axis::Q => "Charge",
        Axis::W => "Weight",
        Axis::X | Axis::Y | Axis::Z => "",
    }
}

/// Write the XDMF document for `store` to `path`.
///
/// Geometry is always three components; dimensions beyond `ndim`, or missing
/// from the store, reference a shared zero-filled item.
pub fn write_xdmf(path: &Path, store: &SortedStore, ndim: usize) -> TrackResult<()> {
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);
    write_xdmf_to(&mut out, store, ndim)?;
    out.flush()?;
    Ok(())
}

pub fn write_xdmf_to<W: Write>(out: &mut W, store: &SortedStore, ndim: usize) -> TrackResult<()> {
    if !(1..=3).contains(&ndim) {
        return Err(TrackError::UnsupportedExport(format!(
            "cannot export tracked particles of a {ndim}D simulation to XDMF"
        )));
    }
    if !store.has_axis(Axis::X) {
        return Err(TrackError::UnsupportedExport(
            "XDMF export requires the 'x' axis in the sorted store".into(),
        ));
    }
    let filename = fs::canonicalize(store.path())?;
    let filename = filename.display().to_string();
    let npoints = store.n_columns();
    let ntimes = store.times().len();
    let spatial: Vec<Option<Axis>> = Axis::SPATIAL
        .iter()
        .enumerate()
        .map(|(d, &axis)| (d < ndim && store.has_axis(axis)).then_some(axis))
        .collect();
    let needs_zeroes = spatial.iter().any(Option::is_none);
    let attributes: Vec<Axis> = store
        .axes()
        .iter()
        .copied()
        .filter(|a| !a.is_spatial())
        .collect();

    writeln!(out, "<?xml version=\"1.0\" ?>")?;
    writeln!(out, "<!DOCTYPE Xdmf SYSTEM \"Xdmf.dtd\" []>")?;
    writeln!(out, "<Xdmf Version=\"3.0\">")?;
    writeln!(out, "\t<Domain>")?;
    if needs_zeroes {
        write!(
            out,
            "\t\t<DataItem Name=\"Zeroes\" ItemType=\"Uniform\" NumberType=\"Float\" Dimensions=\"{npoints}\" Format=\"XML\">"
        )?;
        for _ in 0..npoints {
            write!(out, "0. ")?;
        }
        writeln!(out, "</DataItem>")?;
    }
    writeln!(
        out,
        "\t\t<Grid GridType=\"Collection\" CollectionType=\"Temporal\">"
    )?;
    for (row, time) in store.times().iter().enumerate() {
        writeln!(out, "\t\t\t<Grid Name=\"Timestep_{row}\" GridType=\"Uniform\">")?;
        writeln!(out, "\t\t\t\t<Time Value=\"{time}\" />")?;
        writeln!(
            out,
            "\t\t\t\t<Topology TopologyType=\"Polyvertex\" NumberOfElements=\"{npoints}\"/>"
        )?;
        writeln!(out, "\t\t\t\t<Geometry Name=\"geometry\" GeometryType=\"VXVYVZ\">")?;
        for axis in &spatial {
            match axis {
                Some(axis) => write_hyperslab(
                    out,
                    "\t\t\t\t\t",
                    &filename,
                    axis.name(),
                    number_type(DType::F64),
                    row,
                    ntimes,
                    npoints,
                )?,
                None => writeln!(
                    out,
                    "\t\t\t\t\t<DataItem ItemType=\"Uniform\" NumberType=\"Float\" Dimensions=\"{npoints}\" Precision=\"8\" Format=\"XML\" Reference=\"XML\">/Xdmf/Domain/DataItem[@Name=\"Zeroes\"]</DataItem>"
                )?,
            }
        }
        writeln!(out, "\t\t\t\t</Geometry>")?;
        for &axis in &attributes {
            let info = store.dataset_info(axis)?;
            writeln!(
                out,
                "\t\t\t\t<Attribute Name=\"{}\" Center=\"Node\" AttributeType=\"Scalar\">",
                attribute_name(axis)
            )?;
            write_hyperslab(
                out,
                "\t\t\t\t\t",
                &filename,
                axis.name(),
                number_type(info.dtype),
                row,
                ntimes,
                npoints,
            )?;
            writeln!(out, "\t\t\t\t</Attribute>")?;
        }
        writeln!(out, "\t\t\t</Grid>")?;
    }
    writeln!(out, "\t\t</Grid>")?;
    writeln!(out, "\t</Domain>")?;
    writeln!(out, "</Xdmf>")?;
    Ok(())
}
