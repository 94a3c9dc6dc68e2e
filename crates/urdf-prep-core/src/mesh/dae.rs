//! COLLADA (DAE) geometry loading and saving
//!
//! Documents are read with `dae_parser`. The visual scene is flattened: every
//! `<instance_geometry>` is placed by the composed transforms of its node
//! and its parents, and all instances are merged into one indexed mesh.
//! Materials and texture coordinates are not preserved. Positions are
//! converted to meters and Z-up on load, and written back the same way.

use std::io::{BufWriter, Write};
use std::path::Path;

use dae_parser::{
    ArrayElement, Document, Geometry, GeometryElement, InputList, Mesh, Node, Primitive, Semantic,
    Transform, UpAxis, Url, VisualScene,
};
use glam::{Mat4, Vec3};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use super::{MeshError, TriMesh};

const COLLADA_NAMESPACE: &str = "http://www.collada.org/2005/11/COLLADASchema";

fn parse_error(message: impl Into<String>) -> MeshError {
    MeshError::Parse(message.into())
}

/// Id of a same-document reference (`#id`)
fn fragment(url: &Url) -> Result<&str, MeshError> {
    match url {
        Url::Fragment(id) => Ok(id),
        other => Err(parse_error(format!(
            "external reference {:?} is not supported",
            other
        ))),
    }
}

/// Local transform of one `<matrix>`, `<translate>`, `<rotate>` or `<scale>`
fn local_transform(transform: &Transform) -> Mat4 {
    match transform {
        // COLLADA matrices are row-major
        Transform::Matrix(m) => Mat4::from_cols_slice(&m.0[..]).transpose(),
        Transform::Translate(t) => Mat4::from_translation(Vec3::from_slice(&t.0[..])),
        Transform::Scale(s) => Mat4::from_scale(Vec3::from_slice(&s.0[..])),
        Transform::Rotate(r) => {
            let axis = Vec3::from_slice(&r.0[..3]).normalize_or_zero();
            if axis == Vec3::ZERO {
                Mat4::IDENTITY
            } else {
                Mat4::from_axis_angle(axis, r.0[3].to_radians())
            }
        }
        other => {
            tracing::debug!("Ignoring node transform {:?}", other);
            Mat4::IDENTITY
        }
    }
}

/// Collect `(geometry id, world transform)` for a node and its children
fn collect_instances<'a>(
    node: &'a Node,
    parent: Mat4,
    out: &mut Vec<(&'a str, Mat4)>,
) -> Result<(), MeshError> {
    let world = node
        .transforms
        .iter()
        .fold(parent, |acc, t| acc * local_transform(t));

    for instance in &node.instance_geometry {
        out.push((fragment(&instance.url)?, world));
    }
    for child in &node.children {
        collect_instances(child, world, out)?;
    }
    Ok(())
}

/// Geometry instances of the document's scene, or `None` when it has none
fn scene_instances(document: &Document) -> Result<Option<Vec<(&str, Mat4)>>, MeshError> {
    let wanted = document
        .scene
        .as_ref()
        .and_then(|scene| scene.instance_visual_scene.as_ref())
        .map(|instance| fragment(&instance.url))
        .transpose()?;

    let scene = document
        .iter::<VisualScene>()
        .find(|scene| wanted.is_none() || scene.id.as_deref() == wanted);
    let Some(scene) = scene else {
        return Ok(None);
    };

    let mut instances = Vec::new();
    for node in &scene.nodes {
        collect_instances(node, Mat4::IDENTITY, &mut instances)?;
    }
    Ok((!instances.is_empty()).then_some(instances))
}

/// Positions referenced by the mesh's `<vertices>` element
fn positions(mesh: &Mesh) -> Result<Vec<[f32; 3]>, MeshError> {
    let vertices = mesh
        .vertices
        .as_ref()
        .ok_or_else(|| parse_error("<mesh> has no <vertices>"))?;
    let input = vertices
        .inputs
        .iter()
        .find(|input| matches!(input.semantic, Semantic::Position))
        .ok_or_else(|| parse_error("<vertices> has no POSITION input"))?;
    let id = fragment(&input.source)?;

    let source = mesh
        .sources
        .iter()
        .find(|source| source.id.as_deref() == Some(id))
        .ok_or_else(|| parse_error(format!("unresolved source '{}'", id)))?;
    let data = match &source.array {
        Some(ArrayElement::Float(array)) => &array.val[..],
        _ => return Err(parse_error(format!("source '{}' has no float array", id))),
    };

    let accessor = &source.accessor;
    if accessor.stride < 3 {
        return Err(parse_error(format!(
            "position source '{}' has stride {}",
            id, accessor.stride
        )));
    }

    (0..accessor.count)
        .map(|i| {
            let start = accessor.offset + i * accessor.stride;
            data.get(start..start + 3).map(|p| [p[0], p[1], p[2]])
        })
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| parse_error(format!("float array of '{}' is shorter than its accessor", id)))
}

/// Index stride and VERTEX offset of a primitive's inputs
fn vertex_layout(inputs: &InputList) -> Result<(usize, usize), MeshError> {
    let stride = inputs
        .inputs
        .iter()
        .map(|input| input.offset as usize + 1)
        .max()
        .unwrap_or(1);
    let vertex = inputs
        .inputs
        .iter()
        .find(|input| matches!(input.input.semantic, Semantic::Vertex))
        .ok_or_else(|| parse_error("primitive has no VERTEX input"))?;
    Ok((stride, vertex.offset as usize))
}

/// Append one mesh's triangles to `out`, placed by `transform`
fn append_mesh(mesh: &Mesh, transform: Mat4, out: &mut TriMesh) -> Result<(), MeshError> {
    let points = positions(mesh)?;

    for primitive in &mesh.elements {
        let (inputs, prim, vcount): (&InputList, &[u32], Option<&[u32]>) = match primitive {
            Primitive::Triangles(tris) => match tris.data.prim.as_deref() {
                Some(prim) => (&tris.inputs, prim, None),
                None => continue,
            },
            Primitive::PolyList(poly) => (&poly.inputs, &poly.data.prim[..], Some(&poly.data.vcount[..])),
            _ => {
                tracing::debug!("Skipping non-triangle primitive");
                continue;
            }
        };

        let (stride, offset) = vertex_layout(inputs)?;
        let corners: Vec<usize> = prim.chunks_exact(stride).map(|c| c[offset] as usize).collect();
        let polygon_sizes: Vec<usize> = match vcount {
            Some(vcount) => vcount.iter().map(|&n| n as usize).collect(),
            None => vec![3; corners.len() / 3],
        };

        // Each primitive gets its own copy of the positions; compaction drops the unused ones
        let base = out.vertices.len() as u32;
        out.vertices.extend(
            points
                .iter()
                .map(|&p| transform.transform_point3(Vec3::from(p)).to_array()),
        );

        let mut cursor = 0;
        for size in polygon_sizes {
            let polygon = corners.get(cursor..cursor + size).ok_or_else(|| {
                parse_error("primitive index list is shorter than declared")
            })?;
            cursor += size;

            for i in 1..size.saturating_sub(1) {
                for &corner in &[polygon[0], polygon[i], polygon[i + 1]] {
                    if corner >= points.len() {
                        return Err(parse_error(format!(
                            "vertex index {} out of range ({} positions)",
                            corner,
                            points.len()
                        )));
                    }
                    out.indices.push(base + corner as u32);
                }
            }
        }
    }

    Ok(())
}

fn append_geometry(geometry: &Geometry, transform: Mat4, out: &mut TriMesh) -> Result<(), MeshError> {
    match &geometry.element {
        GeometryElement::Mesh(mesh) => append_mesh(mesh, transform, out),
        _ => {
            tracing::debug!("Skipping geometry {:?}: not a polygon mesh", geometry.id);
            Ok(())
        }
    }
}

fn to_mesh(document: &Document) -> Result<TriMesh, MeshError> {
    let mut mesh = TriMesh::default();

    match scene_instances(document)? {
        Some(instances) => {
            for (id, transform) in instances {
                let geometry = document
                    .iter::<Geometry>()
                    .find(|g| g.id.as_deref() == Some(id))
                    .ok_or_else(|| parse_error(format!("unresolved geometry '{}'", id)))?;
                append_geometry(geometry, transform, &mut mesh)?;
            }
        }
        // No scene to place geometry: take every geometry as authored
        None => {
            for geometry in document.iter::<Geometry>() {
                append_geometry(geometry, Mat4::IDENTITY, &mut mesh)?;
            }
        }
    }
    mesh.compact();

    let meter = document.asset.unit.meter;
    let up_axis = &document.asset.up_axis;
    for v in &mut mesh.vertices {
        let [x, y, z] = v.map(|c| c * meter);
        *v = match up_axis {
            UpAxis::YUp => [x, -z, y],
            UpAxis::XUp => [-y, z, -x],
            UpAxis::ZUp => [x, y, z],
        };
    }

    Ok(mesh)
}

/// Parse COLLADA text into a merged triangle mesh
pub fn parse_dae(xml: &str) -> Result<TriMesh, MeshError> {
    let document =
        Document::from_reader(xml.as_bytes()).map_err(|e| parse_error(format!("{:?}", e)))?;
    to_mesh(&document)
}

/// Load the triangle geometry of a COLLADA file
pub fn load_dae(path: impl AsRef<Path>) -> Result<TriMesh, MeshError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| MeshError::Io(e.to_string()))?;
    let document =
        Document::from_reader(bytes.as_slice()).map_err(|e| parse_error(format!("{:?}", e)))?;
    let mesh = to_mesh(&document)?;

    tracing::debug!(
        "Loaded {:?}: {} vertices, {} faces",
        path,
        mesh.vertex_count(),
        mesh.face_count()
    );

    Ok(mesh)
}

struct DaeWriter<W: Write> {
    writer: Writer<W>,
}

impl<W: Write> DaeWriter<W> {
    fn event(&mut self, event: Event<'_>) -> Result<(), MeshError> {
        self.writer
            .write_event(event)
            .map_err(|e| MeshError::Write(e.to_string()))
    }

    fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), MeshError> {
        let element = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.event(Event::Start(element))
    }

    fn end(&mut self, name: &str) -> Result<(), MeshError> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), MeshError> {
        let element = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.event(Event::Empty(element))
    }

    fn text_element(
        &mut self,
        name: &str,
        attributes: &[(&str, &str)],
        text: &str,
    ) -> Result<(), MeshError> {
        self.start(name, attributes)?;
        self.event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }
}

fn join<T: ToString>(values: impl Iterator<Item = T>) -> String {
    values.map(|v| v.to_string()).collect::<Vec<_>>().join(" ")
}

/// Serialize a mesh as a COLLADA 1.4.1 document
pub fn write_dae<W: Write>(mesh: &TriMesh, name: &str, out: W) -> Result<(), MeshError> {
    let mut w = DaeWriter {
        writer: Writer::new_with_indent(out, b' ', 2),
    };

    let geometry_id = format!("{}-mesh", name);
    let positions_id = format!("{}-positions", geometry_id);
    let array_id = format!("{}-array", positions_id);
    let vertices_id = format!("{}-vertices", geometry_id);
    let float_count = (mesh.vertex_count() * 3).to_string();
    let vertex_count = mesh.vertex_count().to_string();
    let face_count = mesh.face_count().to_string();

    w.event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    w.start(
        "COLLADA",
        &[("xmlns", COLLADA_NAMESPACE), ("version", "1.4.1")],
    )?;

    w.start("asset", &[])?;
    w.start("contributor", &[])?;
    w.text_element("authoring_tool", &[], "urdf-prep")?;
    w.end("contributor")?;
    w.text_element("created", &[], "1970-01-01T00:00:00Z")?;
    w.text_element("modified", &[], "1970-01-01T00:00:00Z")?;
    w.empty("unit", &[("name", "meter"), ("meter", "1")])?;
    w.text_element("up_axis", &[], "Z_UP")?;
    w.end("asset")?;

    w.start("library_geometries", &[])?;
    w.start("geometry", &[("id", geometry_id.as_str()), ("name", name)])?;
    w.start("mesh", &[])?;

    w.start("source", &[("id", positions_id.as_str())])?;
    w.text_element(
        "float_array",
        &[("id", array_id.as_str()), ("count", float_count.as_str())],
        &join(mesh.vertices.iter().flatten()),
    )?;
    w.start("technique_common", &[])?;
    let array_ref = format!("#{}", array_id);
    w.start(
        "accessor",
        &[("source", array_ref.as_str()), ("count", vertex_count.as_str()), ("stride", "3")],
    )?;
    for axis in ["X", "Y", "Z"] {
        w.empty("param", &[("name", axis), ("type", "float")])?;
    }
    w.end("accessor")?;
    w.end("technique_common")?;
    w.end("source")?;

    w.start("vertices", &[("id", vertices_id.as_str())])?;
    let positions_ref = format!("#{}", positions_id);
    w.empty("input", &[("semantic", "POSITION"), ("source", positions_ref.as_str())])?;
    w.end("vertices")?;

    w.start("triangles", &[("count", face_count.as_str())])?;
    let vertices_ref = format!("#{}", vertices_id);
    w.empty(
        "input",
        &[("semantic", "VERTEX"), ("source", vertices_ref.as_str()), ("offset", "0")],
    )?;
    w.text_element("p", &[], &join(mesh.indices.iter()))?;
    w.end("triangles")?;

    w.end("mesh")?;
    w.end("geometry")?;
    w.end("library_geometries")?;

    w.start("library_visual_scenes", &[])?;
    w.start("visual_scene", &[("id", "Scene"), ("name", "Scene")])?;
    w.start("node", &[("id", name), ("name", name)])?;
    let geometry_ref = format!("#{}", geometry_id);
    w.empty("instance_geometry", &[("url", geometry_ref.as_str())])?;
    w.end("node")?;
    w.end("visual_scene")?;
    w.end("library_visual_scenes")?;

    w.start("scene", &[])?;
    w.empty("instance_visual_scene", &[("url", "#Scene")])?;
    w.end("scene")?;

    w.end("COLLADA")
}

/// Save a mesh as a COLLADA file named after the file stem
pub fn save_dae(mesh: &TriMesh, path: impl AsRef<Path>) -> Result<(), MeshError> {
    let path = path.as_ref();
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("mesh")
        .replace(|c: char| c.is_whitespace(), "_");

    let file = std::fs::File::create(path).map_err(|e| MeshError::Io(e.to_string()))?;
    let mut out = BufWriter::new(file);
    write_dae(mesh, &name, &mut out)?;
    out.flush().map_err(|e| MeshError::Io(e.to_string()))
}
