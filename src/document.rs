//! Document handle: one `.xcf` file on disk.
//!
//! Every operation generates a python-fu script, runs it through a
//! `ScriptBackend` and converts pixel payloads with the codec. Pixel data
//! going into GIMP is staged in a temporary file; pixel data coming out is
//! base64 inside the JSON result.

use crate::codec::{self, PixelArray};
use crate::compositor::{self, Canvas, ColorModel, ForegroundColor};
use crate::layer::{self, LayerDescriptor, LayerKind};
use crate::palette::Palette;
use crate::runner::ScriptRunner;
use crate::script::Script;
use crate::{Error, Result, RunnerConfig, ScriptBackend};
use base64::Engine as Base64Engine;
use log::{debug, info};
use ndarray::Axis;
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub(crate) const CREATE_SCRIPT: &str = r#"
filename = get_parameter('file')
image = gimp.pdb.gimp_image_new(get_parameter('width'), get_parameter('height'), get_parameter('base_type'))
colormap = get_parameter('colormap', [])
if len(colormap) > 0:
    gimp.pdb.gimp_image_set_colormap(image, len(colormap), colormap)
layer = gimp.pdb.gimp_layer_new(image, image.width, image.height, get_parameter('layer_type'), get_parameter('layer_name'), 100, gimpenums.NORMAL_MODE)
gimp.pdb.gimp_image_insert_layer(image, layer, None, 0)
write_pixels(layer, get_parameter('data_file'))
save_xcf(image, filename)
gimp.pdb.gimp_image_delete(image)
return_json(True)
"#;

pub(crate) const READ_LAYER_SCRIPT: &str = r#"
image = open_xcf(get_parameter('file'))
payload = layer_payload(image, get_parameter('layer_name'))
gimp.pdb.gimp_image_delete(image)
return_json(payload)
"#;

pub(crate) const WRITE_LAYER_SCRIPT: &str = r#"
filename = get_parameter('file')
name = get_parameter('layer_name')
image = open_xcf(filename)
layer = gimp.pdb.gimp_image_get_layer_by_name(image, name)
if layer is not None and get_parameter('replace'):
    gimp.pdb.gimp_image_remove_layer(image, layer)
    layer = None
if layer is None:
    layer = gimp.pdb.gimp_layer_new(image, get_parameter('width'), get_parameter('height'), get_parameter('layer_type'), name, get_parameter('opacity'), gimpenums.NORMAL_MODE)
    layer.visible = get_parameter('visible')
    gimp.pdb.gimp_image_insert_layer(image, layer, None, 0)
write_pixels(layer, get_parameter('data_file'))
reorder_layer(image, layer, get_parameter('position'))
save_xcf(image, filename)
gimp.pdb.gimp_image_delete(image)
return_json(True)
"#;

pub(crate) const ADD_LAYER_FROM_SCRIPT: &str = r#"
filename = get_parameter('file')
image_src = open_xcf(get_parameter('source_file'))
layer_src = gimp.pdb.gimp_image_get_layer_by_name(image_src, get_parameter('layer_name'))
if layer_src is None:
    return_json({'found': False})
else:
    image_dst = open_xcf(filename)
    name_dst = get_parameter('new_name')
    layer_dst = gimp.pdb.gimp_image_get_layer_by_name(image_dst, name_dst)
    if layer_dst is None:
        layer_dst = gimp.pdb.gimp_layer_new(image_dst, layer_src.width, layer_src.height, layer_src.type, name_dst, layer_src.opacity, layer_src.mode)
        layer_dst.visible = layer_src.visible
        gimp.pdb.gimp_image_insert_layer(image_dst, layer_dst, None, 0)
    gimp.pdb.gimp_edit_copy(layer_src)
    floating = gimp.pdb.gimp_edit_paste(layer_dst, True)
    gimp.pdb.gimp_floating_sel_anchor(floating)
    reorder_layer(image_dst, layer_dst, get_parameter('position'))
    save_xcf(image_dst, filename)
    gimp.pdb.gimp_image_delete(image_dst)
    return_json({'found': True})
gimp.pdb.gimp_image_delete(image_src)
"#;

pub(crate) const LAYERS_SCRIPT: &str = r#"
image = open_xcf(get_parameter('file'))
return_json([
    {'name': layer.name, 'position': position, 'visible': bool(layer.visible), 'opacity': float(layer.opacity)}
    for position, layer in enumerate(image.layers)
])
gimp.pdb.gimp_image_delete(image)
"#;

/// Properties of a layer written with `Document::array_to_layer`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerOptions {
    /// 0.0 to 100.0, clamped
    pub opacity: f64,
    pub visible: bool,
    /// Stack position, 0 is topmost
    pub position: usize,
    /// Defaults to gray or RGB by channel count
    pub kind: Option<LayerKind>,
}

impl Default for LayerOptions {
    fn default() -> Self {
        Self {
            opacity: 100.0,
            visible: true,
            position: 0,
            kind: None,
        }
    }
}

// What READ_LAYER_SCRIPT reports about one layer and its image.
#[derive(Debug, Deserialize)]
struct LayerPayload {
    found: bool,
    base_type: i64,
    canvas_width: usize,
    canvas_height: usize,
    #[serde(default)]
    width: usize,
    #[serde(default)]
    height: usize,
    #[serde(default)]
    bpp: usize,
    #[serde(default)]
    data: Option<String>,
}

impl LayerPayload {
    fn model(&self) -> Result<ColorModel> {
        ColorModel::from_code(self.base_type)
    }

    fn pixels(&self) -> Result<Option<PixelArray>> {
        if !self.found {
            return Ok(None);
        }
        let encoded = self
            .data
            .as_deref()
            .ok_or_else(|| Error::DecodeError("layer payload has no pixel data".into()))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| Error::DecodeError(format!("invalid base64 pixel data: {}", e)))?;
        codec::decode(&bytes, self.width, self.height, self.bpp).map(Some)
    }
}

#[derive(Debug, Deserialize)]
struct Found {
    found: bool,
}

// Parameters of WRITE_LAYER_SCRIPT besides the pixels.
struct WriteRequest<'a> {
    layer_name: &'a str,
    kind: LayerKind,
    opacity: f64,
    visible: bool,
    position: usize,
    replace: bool,
}

/// A layered image document on disk
pub struct Document {
    path: PathBuf,
    backend: Arc<dyn ScriptBackend>,
    timeout: Duration,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("path", &self.path)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Document {
    /// Document backed by its own `ScriptRunner`.
    pub fn new(path: impl Into<PathBuf>, config: RunnerConfig) -> Self {
        let timeout = config.layer_timeout();
        Self::with_backend(path, Arc::new(ScriptRunner::new(config)), timeout)
    }

    /// Document that runs its scripts through `backend`.
    pub fn with_backend(path: impl Into<PathBuf>, backend: Arc<dyn ScriptBackend>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            backend,
            timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_param(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    fn run(&self, script: Script) -> Result<serde_json::Value> {
        self.backend.execute_json(&script, self.timeout)
    }

    /// Create (or overwrite) the file with a single layer holding `array`.
    pub fn create(&self, layer_name: &str, array: &PixelArray) -> Result<()> {
        let model = ColorModel::for_channels(array.len_of(Axis(2)))?;
        self.create_with(layer_name, array, model, None)
    }

    /// Create the file as an indexed image using `palette`.
    ///
    /// `indices` must be single-channel and every value must have a palette
    /// entry.
    pub fn create_indexed(&self, layer_name: &str, indices: &PixelArray, palette: &Palette) -> Result<()> {
        codec::check_indices(indices, palette)?;
        self.create_with(layer_name, indices, ColorModel::Indexed, Some(palette))
    }

    fn create_with(
        &self,
        layer_name: &str,
        array: &PixelArray,
        model: ColorModel,
        palette: Option<&Palette>,
    ) -> Result<()> {
        let (height, width, _) = array.dim();
        let staged = stage_pixels(array)?;
        let mut script = Script::new(CREATE_SCRIPT)
            .param("file", self.file_param())
            .param("width", width)
            .param("height", height)
            .param("base_type", model.code())
            .param("layer_type", LayerKind::for_model(model).code())
            .param("layer_name", layer_name)
            .param("data_file", staged.path().to_string_lossy().into_owned());
        if let Some(palette) = palette {
            script = script.param("colormap", palette.to_flat());
        }

        info!("Creating {} ({}x{} {:?}) with layer '{}'", self.path.display(), width, height, model, layer_name);
        self.run(script)?;
        Ok(())
    }

    fn read_layer(&self, layer_name: &str) -> Result<LayerPayload> {
        let script = Script::new(READ_LAYER_SCRIPT)
            .param("file", self.file_param())
            .param("layer_name", layer_name);
        let payload: LayerPayload = serde_json::from_value(self.run(script)?)?;
        debug!(
            "Read layer '{}' from {}: found={} {}x{}x{}",
            layer_name,
            self.path.display(),
            payload.found,
            payload.height,
            payload.width,
            payload.bpp
        );
        Ok(payload)
    }

    /// Pixels of `layer_name` as a `(height, width, bpp)` array.
    pub fn layer_to_array(&self, layer_name: &str) -> Result<PixelArray> {
        self.read_layer(layer_name)?
            .pixels()?
            .ok_or_else(|| Error::LayerNotFound(layer_name.to_string()))
    }

    /// Add `array` as a new layer, replacing any layer of the same name.
    pub fn array_to_layer(&self, layer_name: &str, array: &PixelArray, options: LayerOptions) -> Result<()> {
        let channels = array.len_of(Axis(2));
        let kind = match options.kind {
            Some(kind) => kind,
            None => LayerKind::for_model(ColorModel::for_channels(channels)?),
        };
        if kind.channels() != channels {
            return Err(Error::UnsupportedChannelCount(channels));
        }
        self.write_layer(
            array,
            WriteRequest {
                layer_name,
                kind,
                opacity: options.opacity.clamp(0.0, 100.0),
                visible: options.visible,
                position: options.position,
                replace: true,
            },
        )
    }

    fn write_layer(&self, array: &PixelArray, request: WriteRequest<'_>) -> Result<()> {
        let (height, width, _) = array.dim();
        let staged = stage_pixels(array)?;
        let script = Script::new(WRITE_LAYER_SCRIPT)
            .param("file", self.file_param())
            .param("layer_name", request.layer_name)
            .param("width", width)
            .param("height", height)
            .param("layer_type", request.kind.code())
            .param("opacity", request.opacity)
            .param("visible", request.visible)
            .param("position", request.position)
            .param("replace", request.replace)
            .param("data_file", staged.path().to_string_lossy().into_owned());

        info!(
            "Writing layer '{}' ({}x{}) to {} at position {}",
            request.layer_name,
            width,
            height,
            self.path.display(),
            request.position
        );
        self.run(script)?;
        Ok(())
    }

    /// Copy `layer_name` from `other` into this document as `new_name`
    /// (defaults to the same name) at `new_position`.
    pub fn add_layer_from(
        &self,
        other: &Document,
        layer_name: &str,
        new_name: Option<&str>,
        new_position: usize,
    ) -> Result<()> {
        let new_name = new_name.unwrap_or(layer_name);
        let script = Script::new(ADD_LAYER_FROM_SCRIPT)
            .param("file", self.file_param())
            .param("source_file", other.file_param())
            .param("layer_name", layer_name)
            .param("new_name", new_name)
            .param("position", new_position);

        info!(
            "Copying layer '{}' from {} to {} as '{}'",
            layer_name,
            other.path.display(),
            self.path.display(),
            new_name
        );
        let found: Found = serde_json::from_value(self.run(script)?)?;
        if !found.found {
            return Err(Error::LayerNotFound(layer_name.to_string()));
        }
        Ok(())
    }

    /// Merge the mask layer `layer_name` of `other` into the layer of the
    /// same name here, then move it to `new_position`.
    ///
    /// A side that lacks the layer counts as plain background. The result
    /// layer is created when this document does not have it yet.
    pub fn merge_layer_from(
        &self,
        other: &Document,
        layer_name: &str,
        foreground: ForegroundColor,
        new_position: usize,
    ) -> Result<()> {
        let src = other.read_layer(layer_name)?;
        let dst = self.read_layer(layer_name)?;
        let src_model = src.model()?;
        let dst_model = dst.model()?;
        let channels = compositor::channels_for(src_model, dst_model)?;
        let canvas = Canvas {
            height: dst.canvas_height,
            width: dst.canvas_width,
            channels,
        };

        let merged = compositor::merge(
            src.pixels()?.as_ref(),
            dst.pixels()?.as_ref(),
            canvas,
            foreground,
        )?;

        self.write_layer(
            &merged,
            WriteRequest {
                layer_name,
                kind: LayerKind::for_model(dst_model),
                opacity: 100.0,
                visible: true,
                position: new_position,
                replace: false,
            },
        )
    }

    /// Layer stack, topmost first.
    pub fn layers(&self) -> Result<Vec<LayerDescriptor>> {
        let script = Script::new(LAYERS_SCRIPT).param("file", self.file_param());
        let layers: Vec<LayerDescriptor> = serde_json::from_value(self.run(script)?)?;
        layer::check_stack(&layers)?;
        Ok(layers)
    }

    /// Layer names, topmost first.
    pub fn layer_names(&self) -> Result<Vec<String>> {
        Ok(self.layers()?.into_iter().map(|l| l.name).collect())
    }
}

fn stage_pixels(array: &PixelArray) -> Result<tempfile::NamedTempFile> {
    let bytes = codec::encode(array)?;
    let mut file = tempfile::Builder::new()
        .prefix("xcfbridge-")
        .suffix(".raw")
        .tempfile()?;
    file.write_all(&bytes)?;
    file.flush()?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RESULT_MARKER;
    use ndarray::{array, Array3};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Clone)]
    struct FakeLayer {
        name: String,
        visible: bool,
        opacity: f64,
        width: usize,
        height: usize,
        bpp: usize,
        data: Vec<u8>,
    }

    #[derive(Clone)]
    struct FakeImage {
        base_type: i64,
        width: usize,
        height: usize,
        colormap: Vec<u8>,
        layers: Vec<FakeLayer>,
    }

    // In-memory stand-in for GIMP that understands the document scripts.
    #[derive(Default)]
    struct FakeGimp {
        images: Mutex<HashMap<String, FakeImage>>,
        calls: Mutex<Vec<String>>,
    }

    fn bpp_for_layer_type(code: i64) -> usize {
        if code == LayerKind::Rgb.code() {
            3
        } else {
            1
        }
    }

    fn p<'a>(script: &'a Script, name: &str) -> &'a Value {
        script
            .params()
            .get(name)
            .unwrap_or_else(|| panic!("missing param {}", name))
    }

    fn s(script: &Script, name: &str) -> String {
        p(script, name).as_str().unwrap().to_string()
    }

    fn n(script: &Script, name: &str) -> usize {
        p(script, name).as_u64().unwrap() as usize
    }

    fn place(layers: &mut Vec<FakeLayer>, name: &str, position: usize) {
        let idx = layers.iter().position(|l| l.name == name).unwrap();
        let layer = layers.remove(idx);
        layers.insert(position.min(layers.len()), layer);
    }

    impl FakeGimp {
        fn handle(&self, script: &Script) -> Value {
            let mut images = self.images.lock().unwrap();
            let body = script.body();
            if body == CREATE_SCRIPT {
                let data = std::fs::read(s(script, "data_file")).unwrap();
                let colormap: Vec<u8> = script
                    .params()
                    .get("colormap")
                    .map(|v| serde_json::from_value(v.clone()).unwrap())
                    .unwrap_or_default();
                let (width, height) = (n(script, "width"), n(script, "height"));
                let layer = FakeLayer {
                    name: s(script, "layer_name"),
                    visible: true,
                    opacity: 100.0,
                    width,
                    height,
                    bpp: bpp_for_layer_type(p(script, "layer_type").as_i64().unwrap()),
                    data,
                };
                images.insert(
                    s(script, "file"),
                    FakeImage {
                        base_type: p(script, "base_type").as_i64().unwrap(),
                        width,
                        height,
                        colormap,
                        layers: vec![layer],
                    },
                );
                json!(true)
            } else if body == READ_LAYER_SCRIPT {
                let image = &images[&s(script, "file")];
                let mut payload = json!({
                    "found": false,
                    "base_type": image.base_type,
                    "canvas_width": image.width,
                    "canvas_height": image.height,
                });
                if let Some(l) = image.layers.iter().find(|l| l.name == s(script, "layer_name")) {
                    payload["found"] = json!(true);
                    payload["width"] = json!(l.width);
                    payload["height"] = json!(l.height);
                    payload["bpp"] = json!(l.bpp);
                    payload["data"] = json!(base64::engine::general_purpose::STANDARD.encode(&l.data));
                }
                payload
            } else if body == WRITE_LAYER_SCRIPT {
                let image = images.get_mut(&s(script, "file")).unwrap();
                let name = s(script, "layer_name");
                let data = std::fs::read(s(script, "data_file")).unwrap();
                let replace = p(script, "replace").as_bool().unwrap();
                if replace {
                    image.layers.retain(|l| l.name != name);
                }
                match image.layers.iter_mut().find(|l| l.name == name) {
                    Some(existing) => existing.data = data,
                    None => image.layers.insert(
                        0,
                        FakeLayer {
                            name: name.clone(),
                            visible: p(script, "visible").as_bool().unwrap(),
                            opacity: p(script, "opacity").as_f64().unwrap(),
                            width: n(script, "width"),
                            height: n(script, "height"),
                            bpp: bpp_for_layer_type(p(script, "layer_type").as_i64().unwrap()),
                            data,
                        },
                    ),
                }
                place(&mut image.layers, &name, n(script, "position"));
                json!(true)
            } else if body == ADD_LAYER_FROM_SCRIPT {
                let src = images[&s(script, "source_file")].clone();
                let Some(layer) = src.layers.iter().find(|l| l.name == s(script, "layer_name")) else {
                    return json!({"found": false});
                };
                let image = images.get_mut(&s(script, "file")).unwrap();
                let new_name = s(script, "new_name");
                image.layers.retain(|l| l.name != new_name);
                let mut copy = layer.clone();
                copy.name = new_name.clone();
                image.layers.insert(0, copy);
                place(&mut image.layers, &new_name, n(script, "position"));
                json!({"found": true})
            } else if body == LAYERS_SCRIPT {
                let image = &images[&s(script, "file")];
                Value::Array(
                    image
                        .layers
                        .iter()
                        .enumerate()
                        .map(|(i, l)| json!({"name": l.name, "position": i, "visible": l.visible, "opacity": l.opacity}))
                        .collect(),
                )
            } else {
                panic!("unexpected script: {}", body)
            }
        }
    }

    impl ScriptBackend for FakeGimp {
        fn execute(&self, script: &Script, _timeout: Duration) -> Result<String> {
            self.calls.lock().unwrap().push(script.body().to_string());
            let result = self.handle(script);
            Ok(format!("GIMP noise\n{}\n{}", RESULT_MARKER, result))
        }
    }

    fn doc(gimp: &Arc<FakeGimp>, path: &str) -> Document {
        Document::with_backend(path, gimp.clone(), Duration::from_secs(1))
    }

    fn checker() -> PixelArray {
        array![
            [[255u8, 255, 255], [0, 0, 0], [255, 255, 255]],
            [[0, 0, 0], [255, 255, 255], [0, 0, 0]],
        ]
    }

    #[test]
    fn create_then_read_back_bit_for_bit() {
        let gimp = Arc::new(FakeGimp::default());
        let d = doc(&gimp, "checker.xcf");
        d.create("Background", &checker()).unwrap();
        assert_eq!(d.layer_to_array("Background").unwrap(), checker());
        assert_eq!(gimp.images.lock().unwrap()["checker.xcf"].base_type, ColorModel::Rgb.code());
    }

    #[test]
    fn missing_layer_is_reported() {
        let gimp = Arc::new(FakeGimp::default());
        let d = doc(&gimp, "a.xcf");
        d.create("Background", &checker()).unwrap();
        assert!(matches!(d.layer_to_array("Nope"), Err(Error::LayerNotFound(name)) if name == "Nope"));
    }

    #[test]
    fn indexed_round_trip_with_default_palette() {
        let gimp = Arc::new(FakeGimp::default());
        let d = doc(&gimp, "indexed.xcf");
        let values = Array3::from_shape_fn((1, 256, 1), |(_, x, _)| x as u8);
        d.create_indexed("Background", &values, &Palette::default()).unwrap();

        let back = d.layer_to_array("Background").unwrap();
        assert_eq!(back.dim(), (1, 256, 1));
        assert_eq!(back, values);

        let images = gimp.images.lock().unwrap();
        let image = &images["indexed.xcf"];
        assert_eq!(image.base_type, ColorModel::Indexed.code());
        assert_eq!(image.colormap, Palette::jet().to_flat());
    }

    #[test]
    fn indexed_rejects_out_of_range_before_running_anything() {
        let gimp = Arc::new(FakeGimp::default());
        let d = doc(&gimp, "indexed.xcf");
        let palette = Palette::new(vec![[0, 0, 0], [255, 255, 255]]).unwrap();
        let values = codec::decode(&[0, 1, 2], 3, 1, 1).unwrap();
        assert!(matches!(
            d.create_indexed("Background", &values, &palette),
            Err(Error::IndexOutOfRange { index: 2, len: 2 })
        ));
        assert!(gimp.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn array_to_layer_sets_properties_and_replaces() {
        let gimp = Arc::new(FakeGimp::default());
        let d = doc(&gimp, "props.xcf");
        d.create("Background", &checker()).unwrap();
        let fg = Array3::from_elem((2, 3, 3), 7u8);
        d.array_to_layer(
            "Foreground",
            &fg,
            LayerOptions {
                opacity: 55.0,
                visible: false,
                ..Default::default()
            },
        )
        .unwrap();

        let layers = d.layers().unwrap();
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0].name, "Foreground");
        assert_eq!(layers[0].opacity, 55.0);
        assert!(!layers[0].visible);
        assert_eq!(layers[1].name, "Background");
        assert_eq!(d.layer_to_array("Foreground").unwrap(), fg);

        // same name again replaces instead of duplicating
        d.array_to_layer("Foreground", &checker(), LayerOptions::default()).unwrap();
        assert_eq!(d.layer_names().unwrap(), vec!["Foreground", "Background"]);
        assert_eq!(d.layer_to_array("Foreground").unwrap(), checker());
    }

    #[test]
    fn array_to_layer_checks_kind_against_channels() {
        let gimp = Arc::new(FakeGimp::default());
        let d = doc(&gimp, "k.xcf");
        let rgb = Array3::<u8>::zeros((1, 1, 3));
        let err = d
            .array_to_layer(
                "Values",
                &rgb,
                LayerOptions {
                    kind: Some(LayerKind::Indexed),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedChannelCount(3)));
    }

    #[test]
    fn add_layer_from_copies_and_reorders() {
        let gimp = Arc::new(FakeGimp::default());
        let yellow = doc(&gimp, "black_and_yellow.xcf");
        yellow.create("Background", &Array3::zeros((2, 3, 3))).unwrap();
        let yellow_px = Array3::from_shape_fn((2, 3, 3), |(_, _, c)| [240u8, 255, 0][c]);
        yellow.array_to_layer("Yellow", &yellow_px, LayerOptions::default()).unwrap();

        let d = doc(&gimp, "target.xcf");
        d.create("Background", &checker()).unwrap();
        d.add_layer_from(&yellow, "Yellow", Some("Yellow (copied)"), 1).unwrap();

        assert_eq!(d.layers().unwrap()[1].name, "Yellow (copied)");
        assert_eq!(d.layer_to_array("Yellow (copied)").unwrap(), yellow_px);

        assert!(matches!(
            d.add_layer_from(&yellow, "Magenta", None, 0),
            Err(Error::LayerNotFound(name)) if name == "Magenta"
        ));
    }

    #[test]
    fn merge_layer_from_takes_max_for_white_masks() {
        let gimp = Arc::new(FakeGimp::default());
        let a = doc(&gimp, "a.xcf");
        let b = doc(&gimp, "b.xcf");
        a.create("Mask", &checker()).unwrap();
        let other = Array3::from_shape_fn((2, 3, 3), |(y, _, _)| if y == 0 { 255u8 } else { 0 });
        b.create("Mask", &other).unwrap();

        a.merge_layer_from(&b, "Mask", ForegroundColor::White, 0).unwrap();
        let merged = a.layer_to_array("Mask").unwrap();
        let expected = array![
            [[255u8, 255, 255], [255, 255, 255], [255, 255, 255]],
            [[0, 0, 0], [255, 255, 255], [0, 0, 0]],
        ];
        assert_eq!(merged, expected);
    }

    #[test]
    fn merge_layer_from_creates_missing_destination() {
        let gimp = Arc::new(FakeGimp::default());
        let a = doc(&gimp, "a.xcf");
        let b = doc(&gimp, "b.xcf");
        a.create("Background", &Array3::from_elem((2, 3, 1), 9u8)).unwrap();
        let mask = Array3::from_shape_fn((2, 3, 1), |(y, x, _)| if x == y { 0u8 } else { 255 });
        b.create("Mask", &mask).unwrap();

        a.merge_layer_from(&b, "Mask", ForegroundColor::Black, 1).unwrap();
        // absent destination is white background under a black foreground
        assert_eq!(a.layer_to_array("Mask").unwrap(), mask);
        assert_eq!(a.layer_names().unwrap(), vec!["Background", "Mask"]);
    }

    #[test]
    fn merge_layer_from_rejects_mixed_color_models() {
        let gimp = Arc::new(FakeGimp::default());
        let a = doc(&gimp, "rgb.xcf");
        let b = doc(&gimp, "gray.xcf");
        a.create("Mask", &checker()).unwrap();
        b.create("Mask", &Array3::zeros((2, 3, 1))).unwrap();
        assert!(matches!(
            a.merge_layer_from(&b, "Mask", ForegroundColor::White, 0),
            Err(Error::ImageTypeMismatch {
                src: ColorModel::Gray,
                dst: ColorModel::Rgb
            })
        ));
    }

    #[test]
    fn merge_layer_from_rejects_indexed_images() {
        let gimp = Arc::new(FakeGimp::default());
        let a = doc(&gimp, "a.xcf");
        let b = doc(&gimp, "b.xcf");
        let values = Array3::<u8>::zeros((1, 2, 1));
        a.create_indexed("Mask", &values, &Palette::jet()).unwrap();
        b.create_indexed("Mask", &values, &Palette::jet()).unwrap();
        assert!(matches!(
            a.merge_layer_from(&b, "Mask", ForegroundColor::White, 0),
            Err(Error::UnsupportedColorModel(_))
        ));
    }

    #[test]
    fn create_rejects_alpha_arrays() {
        let gimp = Arc::new(FakeGimp::default());
        let d = doc(&gimp, "rgba.xcf");
        assert!(matches!(
            d.create("Background", &Array3::zeros((1, 1, 4))),
            Err(Error::UnsupportedChannelCount(4))
        ));
    }
}
