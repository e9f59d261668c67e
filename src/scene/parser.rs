//! Scene text parser.
//!
//! The format is a sequence of blocks, each introduced by a header line and
//! (conventionally) wrapped in braces:
//!
//! ```text
//! Image            Transformation     Material          Triangles
//! {                {                  {                 {
//! 640 480          T 0 0 -5           1 0 0             0          <- transform index
//! 0 0 0            Rx 30              0.1 0.8 0.2 0 1   0          <- material index
//! }                S 2 2 2            }                 0 0 0
//!                  }                                    1 0 0
//!                                                       0 1 0
//!                                                       }
//! ```
//!
//! Fixed-shape blocks (`Image`, `Material`, `Camera`, `Light`, `Sphere`,
//! `Box`) read a static number of value lines. `Transformation` and
//! `Triangles` run until a `}` line. Blank lines and `{` lines are skipped
//! everywhere, so the brace layout is optional for fixed-shape blocks.
//!
//! Indices must refer to table entries defined earlier in the text. Any
//! violation aborts the whole parse with [`Error::MalformedScene`] carrying
//! the 0-based line number; no partial scene is returned.

use smallvec::SmallVec;
use tracing::{debug, warn};

use super::{
    CameraEntity, Entity, ImageSettings, LightEntity, Material, MeshEntity, PrimitiveEntity,
    PrimitiveShape, Scene, Transformation, Triangle,
};
use crate::util::{Error, Result, Vec3};

type Tokens<'a> = SmallVec<[&'a str; 5]>;

/// Parser behavior switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Fail on unrecognized tags inside `Transformation` blocks instead of
    /// logging and skipping them.
    pub strict_transform_tags: bool,
}

impl ParseOptions {
    pub fn strict() -> Self {
        Self { strict_transform_tags: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Image,
    Transformation,
    Material,
    Camera,
    Light,
    Triangles,
    Sphere,
    Box,
}

impl Block {
    fn from_keyword(word: &str) -> Option<Self> {
        Some(match word {
            "Image" => Self::Image,
            "Transformation" => Self::Transformation,
            "Material" => Self::Material,
            "Camera" => Self::Camera,
            "Light" => Self::Light,
            "Triangles" => Self::Triangles,
            "Sphere" => Self::Sphere,
            "Box" => Self::Box,
            _ => return None,
        })
    }
}

/// Parse scene text with default options.
pub fn parse_scene(text: &str) -> Result<Scene> {
    parse_scene_with(text, ParseOptions::default())
}

/// Parse scene text.
#[tracing::instrument(skip_all, fields(bytes = text.len()))]
pub fn parse_scene_with(text: &str, options: ParseOptions) -> Result<Scene> {
    let parser = Parser {
        cursor: Cursor::new(text),
        options,
        scene: Scene::default(),
    };
    let scene = parser.run()?;
    debug!(
        transformations = scene.transformations.len(),
        materials = scene.materials.len(),
        entities = scene.entities.len(),
        "scene parsed"
    );
    Ok(scene)
}

/// Line cursor over trimmed lines, skipping structural filler.
struct Cursor<'a> {
    lines: Vec<&'a str>,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            lines: text.split('\n').map(str::trim).collect(),
            pos: 0,
        }
    }

    fn peek_content(&self) -> Option<(usize, &'a str)> {
        self.lines[self.pos..]
            .iter()
            .enumerate()
            .map(|(offset, line)| (self.pos + offset, *line))
            .find(|(_, line)| !line.is_empty() && *line != "{")
    }

    fn next_content(&mut self) -> Option<(usize, &'a str)> {
        let found = self.peek_content();
        self.pos = found.map_or(self.lines.len(), |(i, _)| i + 1);
        found
    }

    /// Next content line split into tokens; end of input is an error.
    fn expect_line(&mut self, what: &str) -> Result<(usize, Tokens<'a>)> {
        match self.next_content() {
            Some((line, text)) => Ok((line, tokenize(text))),
            None => Err(Error::malformed(
                self.lines.len().saturating_sub(1),
                format!("unexpected end of input, expected {what}"),
            )),
        }
    }

    /// Consume the closing brace of a fixed-shape block if present.
    fn skip_closing(&mut self) {
        if let Some((_, "}")) = self.peek_content() {
            self.next_content();
        }
    }
}

fn tokenize(line: &str) -> Tokens<'_> {
    line.split_ascii_whitespace().collect()
}

fn expect_count(line: usize, values: &[&str], count: usize, what: &str) -> Result<()> {
    if values.len() != count {
        return Err(Error::malformed(
            line,
            format!("expected {count} value(s) for {what}, found {}", values.len()),
        ));
    }
    Ok(())
}

fn parse_f32(line: usize, token: &str, what: &str) -> Result<f32> {
    match token.parse::<f32>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(Error::malformed(line, format!("invalid number '{token}' for {what}"))),
    }
}

fn parse_scalar(line: usize, values: &[&str], what: &str) -> Result<f32> {
    expect_count(line, values, 1, what)?;
    parse_f32(line, values[0], what)
}

fn parse_vec3(line: usize, values: &[&str], what: &str) -> Result<Vec3> {
    expect_count(line, values, 3, what)?;
    Ok(Vec3::new(
        parse_f32(line, values[0], what)?,
        parse_f32(line, values[1], what)?,
        parse_f32(line, values[2], what)?,
    ))
}

fn parse_u32(line: usize, token: &str, what: &str) -> Result<u32> {
    token
        .parse::<u32>()
        .map_err(|_| Error::malformed(line, format!("invalid integer '{token}' for {what}")))
}

fn parse_index(line: usize, values: &[&str], defined: usize, table: &str) -> Result<usize> {
    let what = format!("{table} index");
    expect_count(line, values, 1, &what)?;
    let index = values[0]
        .parse::<usize>()
        .map_err(|_| Error::malformed(line, format!("invalid {what} '{}'", values[0])))?;
    if index >= defined {
        return Err(Error::malformed(
            line,
            format!("{what} {index} out of range ({defined} defined)"),
        ));
    }
    Ok(index)
}

struct Parser<'a> {
    cursor: Cursor<'a>,
    options: ParseOptions,
    scene: Scene,
}

impl Parser<'_> {
    fn run(mut self) -> Result<Scene> {
        while let Some((line, text)) = self.cursor.next_content() {
            let tokens = tokenize(text);
            let header = tokens[0];
            if header == "}" {
                return Err(Error::malformed(line, "unexpected '}' outside of a block"));
            }
            let block = Block::from_keyword(header)
                .ok_or_else(|| Error::malformed(line, format!("unknown block header '{header}'")))?;
            if tokens[1..].iter().any(|t| *t != "{") || tokens.len() > 2 {
                return Err(Error::malformed(line, format!("unexpected tokens after '{header}'")));
            }
            debug!(line, ?block, "block");

            match block {
                Block::Image => self.image()?,
                Block::Transformation => self.transformation()?,
                Block::Material => self.material()?,
                Block::Camera => self.camera()?,
                Block::Light => self.light()?,
                Block::Triangles => self.triangles()?,
                Block::Sphere => self.primitive(PrimitiveShape::Sphere)?,
                Block::Box => self.primitive(PrimitiveShape::Box)?,
            }
        }
        Ok(self.scene)
    }

    fn transform_ref(&mut self) -> Result<usize> {
        let (line, t) = self.cursor.expect_line("transformation index")?;
        parse_index(line, &t, self.scene.transformations.len(), "transformation")
    }

    fn material_ref(&mut self) -> Result<usize> {
        let (line, t) = self.cursor.expect_line("material index")?;
        parse_index(line, &t, self.scene.materials.len(), "material")
    }

    fn image(&mut self) -> Result<()> {
        let (line, t) = self.cursor.expect_line("image size 'W H'")?;
        expect_count(line, &t, 2, "image size")?;
        let width = parse_u32(line, t[0], "image width")?;
        let height = parse_u32(line, t[1], "image height")?;

        let (line, t) = self.cursor.expect_line("background color 'R G B'")?;
        let background = parse_vec3(line, &t, "background color")?;

        self.scene.image = Some(ImageSettings { width, height, background });
        self.cursor.skip_closing();
        Ok(())
    }

    fn transformation(&mut self) -> Result<()> {
        let mut transform = Transformation::default();
        loop {
            let (line, t) = self.cursor.expect_line("transformation entry or '}'")?;
            let values = &t[1..];
            match t[0] {
                "}" => {
                    expect_count(line, values, 0, "closing brace")?;
                    break;
                }
                "T" => transform.translation = parse_vec3(line, values, "translation")?,
                "S" => transform.scale = parse_vec3(line, values, "scale")?,
                "Rx" => transform.rotation.x = parse_scalar(line, values, "rotation")?,
                "Ry" => transform.rotation.y = parse_scalar(line, values, "rotation")?,
                "Rz" => transform.rotation.z = parse_scalar(line, values, "rotation")?,
                tag if Block::from_keyword(tag).is_some() => {
                    return Err(Error::malformed(
                        line,
                        format!("'{tag}' inside an unterminated Transformation block"),
                    ));
                }
                tag if self.options.strict_transform_tags => {
                    return Err(Error::malformed(
                        line,
                        format!("unknown transformation tag '{tag}'"),
                    ));
                }
                tag => warn!(line, tag, "ignoring unknown transformation tag"),
            }
        }
        self.scene.transformations.push(transform);
        Ok(())
    }

    fn material(&mut self) -> Result<()> {
        let (line, t) = self.cursor.expect_line("material color 'R G B'")?;
        let color = parse_vec3(line, &t, "material color")?;

        let (line, t) = self.cursor.expect_line("material factors 'Ka Kd Ks Kr IOR'")?;
        expect_count(line, &t, 5, "material factors")?;
        let f = |i: usize| parse_f32(line, t[i], "material factor");
        let material = Material {
            color,
            ambient: f(0)?,
            diffuse: f(1)?,
            specular: f(2)?,
            reflection: f(3)?,
            ior: f(4)?,
        };

        self.scene.materials.push(material);
        self.cursor.skip_closing();
        Ok(())
    }

    fn camera(&mut self) -> Result<()> {
        let transform = self.transform_ref()?;
        let (line, t) = self.cursor.expect_line("field of view")?;
        let fov = parse_scalar(line, &t, "field of view")?;
        let (line, t) = self.cursor.expect_line("camera distance")?;
        let distance = parse_scalar(line, &t, "camera distance")?;

        self.scene.entities.push(Entity::Camera(CameraEntity { transform, fov, distance }));
        self.cursor.skip_closing();
        Ok(())
    }

    fn light(&mut self) -> Result<()> {
        let transform = self.transform_ref()?;
        let (line, t) = self.cursor.expect_line("light color 'R G B'")?;
        let color = parse_vec3(line, &t, "light color")?;

        self.scene.entities.push(Entity::Light(LightEntity { transform, color }));
        self.cursor.skip_closing();
        Ok(())
    }

    fn triangles(&mut self) -> Result<()> {
        let transform = self.transform_ref()?;
        let mut triangles = Vec::new();
        loop {
            let (line, t) = self.cursor.expect_line("triangle material index or '}'")?;
            if t[0] == "}" {
                expect_count(line, &t[1..], 0, "closing brace")?;
                break;
            }
            let index = parse_index(line, &t, self.scene.materials.len(), "material")?;
            let material = self.scene.materials[index];

            let mut points = [Vec3::ZERO; 3];
            for point in &mut points {
                let (line, t) = self.cursor.expect_line("triangle vertex 'X Y Z'")?;
                *point = parse_vec3(line, &t, "triangle vertex")?;
            }
            triangles.push(Triangle { points, material });
        }

        debug!(triangles = triangles.len(), "mesh");
        self.scene.entities.push(Entity::Mesh(MeshEntity { transform, triangles }));
        Ok(())
    }

    fn primitive(&mut self, shape: PrimitiveShape) -> Result<()> {
        let transform = self.transform_ref()?;
        let material = self.material_ref()?;

        self.scene.entities.push(Entity::Primitive(PrimitiveEntity { shape, transform, material }));
        self.cursor.skip_closing();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY: &str = "Transformation\n{\n}\n\n";

    fn lines(ls: &[&str]) -> String {
        ls.join("\n")
    }

    #[test]
    fn test_camera_compact_layout() {
        let text = format!("{IDENTITY}Camera\n\n\n0\n\n90\n\n500\n\n\n");
        let scene = parse_scene(&text).expect("parse");
        assert_eq!(scene.entities.len(), 1);
        assert_eq!(
            scene.entities[0],
            Entity::Camera(CameraEntity { transform: 0, fov: 90.0, distance: 500.0 })
        );
    }

    #[test]
    fn test_image_settings() {
        let text = lines(&["Image", "{", "640 480", "0 0.5 1", "}", ""]);
        let scene = parse_scene(&text).expect("parse");
        let image = scene.image.expect("image settings");
        assert_eq!((image.width, image.height), (640, 480));
        assert_eq!(image.background, Vec3::new(0.0, 0.5, 1.0));
        assert!(scene.entities.is_empty());
    }

    #[test]
    fn test_no_image_block() {
        let scene = parse_scene(IDENTITY).expect("parse");
        assert!(scene.image.is_none());
        assert_eq!(scene.transformations, vec![Transformation::default()]);
    }

    #[test]
    fn test_transformation_last_value_wins() {
        let a = lines(&[
            "Transformation", "{", "T 1 2 3", "Rz 45", "T 4 5 6", "S 2 2 2", "Rx 10", "}",
        ]);
        let b = lines(&["Transformation", "{", "Rx 10", "S 2 2 2", "T 4 5 6", "Rz 45", "}"]);
        let ta = parse_scene(&a).expect("parse a").transformations[0];
        let tb = parse_scene(&b).expect("parse b").transformations[0];
        assert_eq!(ta, tb);
        assert_eq!(ta.translation, Vec3::new(4.0, 5.0, 6.0));
        assert_eq!(ta.rotation, Vec3::new(10.0, 0.0, 45.0));
        assert_eq!(ta.scale, Vec3::splat(2.0));
    }

    #[test]
    fn test_fractional_rotation() {
        let text = lines(&["Transformation", "{", "Ry 12.5", "}"]);
        let scene = parse_scene(&text).expect("parse");
        assert_eq!(scene.transformations[0].rotation.y, 12.5);
    }

    #[test]
    fn test_unknown_tag_permissive_and_strict() {
        let text = lines(&["Transformation", "{", "T 1 0 0", "Q 1 2 3", "}"]);
        let scene = parse_scene(&text).expect("permissive parse");
        assert_eq!(scene.transformations[0].translation, Vec3::X);

        let err = parse_scene_with(&text, ParseOptions::strict()).unwrap_err();
        assert_eq!(err.line(), Some(3));
        assert!(err.to_string().contains("'Q'"));
    }

    #[test]
    fn test_unterminated_transformation() {
        let text = lines(&[
            "Transformation", "{", "T 1 0 0", "", "Material", "{", "1 1 1", "0 1 0 0 1", "}",
        ]);
        let err = parse_scene(&text).unwrap_err();
        assert_eq!(err.line(), Some(4));
    }

    #[test]
    fn test_material_out_of_range() {
        let text = lines(&[
            "Transformation", "{", "}", "",
            "Material", "{", "1 0 0", "0.1 0.8 0.2 0 1", "}", "",
            "Material", "{", "0 1 0", "0.1 0.8 0.2 0 1", "}", "",
            "Triangles", "{", "0", "5", "0 0 0", "1 0 0", "0 1 0", "}",
        ]);
        let err = parse_scene(&text).unwrap_err();
        assert!(matches!(err, Error::MalformedScene { line: 19, .. }), "{err}");
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_transform_index_must_be_defined_earlier() {
        let text = lines(&["Light", "{", "0", "1 1 1", "}", "", "Transformation", "{", "}"]);
        let err = parse_scene(&text).unwrap_err();
        assert_eq!(err.line(), Some(2));
    }

    #[test]
    fn test_triangles_carry_material_by_value() {
        let text = lines(&[
            "Transformation", "{", "}", "",
            "Material", "{", "1 0 0", "0.1 0.8 0.2 0 1", "}", "",
            "Material", "{", "0 0 1", "0.2 0.6 0.4 0.5 1.5", "}", "",
            "Triangles", "{", "0",
            "1", "0 0 0", "1 0 0", "0 1 0",
            "0", "0 0 1", "1 0 1", "0 1 1",
            "}",
        ]);
        let scene = parse_scene(&text).expect("parse");
        let Entity::Mesh(mesh) = &scene.entities[0] else {
            panic!("expected mesh, got {:?}", scene.entities[0]);
        };
        assert_eq!(mesh.triangles.len(), 2);
        assert_eq!(mesh.triangles[0].material, scene.materials[1]);
        assert_eq!(mesh.triangles[1].material, scene.materials[0]);
        assert_eq!(mesh.triangles[1].points[2], Vec3::new(0.0, 1.0, 1.0));
        assert_eq!(scene.materials[1].ior, 1.5);
    }

    #[test]
    fn test_primitives() {
        let text = lines(&[
            "Transformation", "{", "S 3 3 3", "}", "",
            "Material", "{", "1 1 1", "0.1 0.8 0.2 0 1", "}", "",
            "Sphere", "{", "0", "0", "}", "",
            "Box {", "0", "0", "}",
        ]);
        let scene = parse_scene(&text).expect("parse");
        assert_eq!(scene.entities.len(), 2);
        assert_eq!(scene.entities[0].kind(), "Sphere");
        assert_eq!(scene.entities[1].kind(), "Box");
    }

    #[test]
    fn test_unknown_header() {
        let err = parse_scene("\n\nCone\n{\n0\n}\n").unwrap_err();
        assert_eq!(err.line(), Some(2));
        assert!(err.to_string().contains("Cone"));
    }

    #[test]
    fn test_stray_closing_brace() {
        let err = parse_scene(&format!("{IDENTITY}}}\n")).unwrap_err();
        assert_eq!(err.line(), Some(4));
    }

    #[test]
    fn test_bad_number_and_count() {
        let err = parse_scene(&lines(&["Image", "{", "640 abc", "1 1 1", "}"])).unwrap_err();
        assert_eq!(err.line(), Some(2));
        assert!(err.to_string().contains("abc"));

        let err = parse_scene(&lines(&["Image", "{", "640 480", "1 1", "}"])).unwrap_err();
        assert_eq!(err.line(), Some(3));

        let err = parse_scene(&lines(&["Transformation", "{", "T 1 nan 0", "}"])).unwrap_err();
        assert_eq!(err.line(), Some(2));
    }

    #[test]
    fn test_end_of_input_inside_block() {
        let err = parse_scene(&lines(&["Transformation", "{", "T 1 0 0"])).unwrap_err();
        assert!(err.to_string().contains("end of input"));

        let err = parse_scene(&format!("{IDENTITY}Camera\n{{\n0\n90\n")).unwrap_err();
        assert!(err.to_string().contains("camera distance"));
    }

    #[test]
    fn test_windows_line_endings() {
        let text = "Transformation\r\n{\r\nT 1 2 3\r\n}\r\n\r\nLight\r\n{\r\n0\r\n1 0 0\r\n}\r\n";
        let scene = parse_scene(text).expect("parse");
        assert_eq!(scene.transformations[0].translation, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(scene.entities.len(), 1);
    }
}
