//! Vertex layouts: the default `Vertex`, user `VertexDecl`arations and the
//! per-device compiled forms of both.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use byteorder::{ByteOrder, NativeEndian};
use smallvec::SmallVec;

use crate::math::Color;

use super::backends::{
    AttribLayout, ComponentKind, D3dCaps, D3dDeclType, D3dDevice, D3dElement, D3dUsage,
};
use super::errors::*;

/// Number of `Attribute::UserAttr` slots.
pub const MAX_USER_ATTRIBUTES: usize = 10;

/// The vertex consumed when no declaration is supplied. Texture coordinates
/// are in pixels of the bound texture.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct Vertex {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub u: f32,
    pub v: f32,
    pub color: Color,
}

impl Vertex {
    pub fn new(x: f32, y: f32, u: f32, v: f32, color: Color) -> Self {
        Vertex {
            x,
            y,
            z: 0.0,
            u,
            v,
            color,
        }
    }
}

/// Views a slice of default vertices as raw bytes.
pub fn as_bytes(vertices: &[Vertex]) -> &[u8] {
    unsafe {
        ::std::slice::from_raw_parts(
            vertices.as_ptr() as *const u8,
            vertices.len() * ::std::mem::size_of::<Vertex>(),
        )
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Attribute {
    Position,
    Color,
    /// Texture coordinates normalized to [0, 1].
    TexCoord,
    /// Texture coordinates in pixels.
    TexCoordPixel,
    UserAttr(u8),
}

impl Attribute {
    /// The reserved shader attribute name this slot binds to.
    pub fn name(self) -> String {
        match self {
            Attribute::Position => super::shader::names::POS.into(),
            Attribute::Color => super::shader::names::COLOR.into(),
            Attribute::TexCoord | Attribute::TexCoordPixel => {
                super::shader::names::TEXCOORD.into()
            }
            Attribute::UserAttr(n) => super::shader::names::user_attr(n),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Storage {
    Float1,
    Float2,
    Float3,
    Float4,
    Short2,
    Short4,
    UByte4,
    NormalizedUByte4,
    NormalizedShort2,
    NormalizedShort4,
    NormalizedUShort2,
    NormalizedUShort4,
    HalfFloat2,
    HalfFloat4,
}

impl Storage {
    pub fn components(self) -> u8 {
        match self {
            Storage::Float1 => 1,
            Storage::Float2
            | Storage::Short2
            | Storage::NormalizedShort2
            | Storage::NormalizedUShort2
            | Storage::HalfFloat2 => 2,
            Storage::Float3 => 3,
            _ => 4,
        }
    }

    pub fn kind(self) -> ComponentKind {
        match self {
            Storage::Float1 | Storage::Float2 | Storage::Float3 | Storage::Float4 => {
                ComponentKind::Float
            }
            Storage::Short2
            | Storage::Short4
            | Storage::NormalizedShort2
            | Storage::NormalizedShort4 => ComponentKind::Short,
            Storage::NormalizedUShort2 | Storage::NormalizedUShort4 => ComponentKind::UShort,
            Storage::UByte4 | Storage::NormalizedUByte4 => ComponentKind::UByte,
            Storage::HalfFloat2 | Storage::HalfFloat4 => ComponentKind::HalfFloat,
        }
    }

    pub fn normalized(self) -> bool {
        match self {
            Storage::NormalizedUByte4
            | Storage::NormalizedShort2
            | Storage::NormalizedShort4
            | Storage::NormalizedUShort2
            | Storage::NormalizedUShort4 => true,
            _ => false,
        }
    }

    pub fn size(self) -> usize {
        let component = match self.kind() {
            ComponentKind::Float => 4,
            ComponentKind::Short | ComponentKind::UShort | ComponentKind::HalfFloat => 2,
            ComponentKind::UByte => 1,
        };

        component * self.components() as usize
    }

    /// The declaration type on devices with `caps`, if there is one.
    pub fn d3d_type(self, caps: &D3dCaps) -> Option<D3dDeclType> {
        let ty = match self {
            Storage::Float1 => D3dDeclType::Float1,
            Storage::Float2 => D3dDeclType::Float2,
            Storage::Float3 => D3dDeclType::Float3,
            Storage::Float4 => D3dDeclType::Float4,
            Storage::Short2 => D3dDeclType::Short2,
            Storage::Short4 => D3dDeclType::Short4,
            Storage::UByte4 => D3dDeclType::UByte4,
            Storage::NormalizedUByte4 => D3dDeclType::UByte4N,
            Storage::NormalizedShort2 => D3dDeclType::Short2N,
            Storage::NormalizedShort4 => D3dDeclType::Short4N,
            Storage::NormalizedUShort2 => D3dDeclType::UShort2N,
            Storage::NormalizedUShort4 => D3dDeclType::UShort4N,
            Storage::HalfFloat2 => D3dDeclType::Float16x2,
            Storage::HalfFloat4 => D3dDeclType::Float16x4,
        };

        if self.normalized() && self != Storage::NormalizedUByte4 && !caps.normalized_declarations
        {
            return None;
        }

        if self.kind() == ComponentKind::HalfFloat && !caps.float16_declarations {
            return None;
        }

        Some(ty)
    }

    /// Decodes one element, filling missing components with (0, 0, 0, 1).
    pub fn read(self, bytes: &[u8]) -> [f32; 4] {
        let mut out = [0.0, 0.0, 0.0, 1.0];
        let n = self.components() as usize;
        let normalized = self.normalized();

        for (i, v) in out.iter_mut().enumerate().take(n) {
            *v = match self.kind() {
                ComponentKind::Float => NativeEndian::read_f32(&bytes[i * 4..]),
                ComponentKind::HalfFloat => {
                    half::f16::from_bits(NativeEndian::read_u16(&bytes[i * 2..])).to_f32()
                }
                ComponentKind::Short => {
                    let s = f32::from(NativeEndian::read_i16(&bytes[i * 2..]));
                    if normalized {
                        (s / 32767.0).max(-1.0)
                    } else {
                        s
                    }
                }
                ComponentKind::UShort => {
                    let s = f32::from(NativeEndian::read_u16(&bytes[i * 2..]));
                    if normalized {
                        s / 65535.0
                    } else {
                        s
                    }
                }
                ComponentKind::UByte => {
                    let s = f32::from(bytes[i]);
                    if normalized {
                        s / 255.0
                    } else {
                        s
                    }
                }
            };
        }

        out
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VertexElement {
    pub attribute: Attribute,
    pub storage: Storage,
    pub offset: usize,
}

impl VertexElement {
    pub fn new(attribute: Attribute, storage: Storage, offset: usize) -> Self {
        VertexElement {
            attribute,
            storage,
            offset,
        }
    }

    pub fn layout(&self, stride: usize) -> AttribLayout {
        AttribLayout {
            components: self.storage.components(),
            kind: self.storage.kind(),
            normalized: self.storage.normalized(),
            stride,
            offset: self.offset,
        }
    }
}

#[derive(Debug)]
struct DeclInner {
    id: u64,
    elements: SmallVec<[VertexElement; 4]>,
    stride: usize,
}

/// An ordered set of typed attribute slots. Cheap to clone; clones share the
/// per-device compiled forms.
#[derive(Debug, Clone)]
pub struct VertexDecl(Arc<DeclInner>);

static DECL_IDS: AtomicU64 = AtomicU64::new(1);

impl VertexDecl {
    pub fn new(elements: &[VertexElement], stride: usize) -> Result<Self> {
        if stride == 0 {
            return Err(Error::InvalidDeclaration("stride must not be zero".into()));
        }

        let mut position = false;
        let mut texcoord = false;

        for (i, e) in elements.iter().enumerate() {
            if elements[..i].iter().any(|v| v.attribute == e.attribute) {
                let msg = format!("{:?} is declared twice", e.attribute);
                return Err(Error::InvalidDeclaration(msg));
            }

            if e.offset + e.storage.size() > stride {
                let msg = format!("{:?} exceeds the stride of {} bytes", e.attribute, stride);
                return Err(Error::InvalidDeclaration(msg));
            }

            match e.attribute {
                Attribute::Position => position = true,
                Attribute::Color if e.storage != Storage::Float4 => {
                    let msg = "colors must be stored as Float4".to_owned();
                    return Err(Error::InvalidDeclaration(msg));
                }
                Attribute::TexCoord | Attribute::TexCoordPixel => {
                    if texcoord {
                        let msg = "only one texture coordinate slot is allowed".to_owned();
                        return Err(Error::InvalidDeclaration(msg));
                    }
                    texcoord = true;
                }
                Attribute::UserAttr(n) if n as usize >= MAX_USER_ATTRIBUTES => {
                    let msg = format!("user attribute {} is out of range", n);
                    return Err(Error::InvalidDeclaration(msg));
                }
                _ => {}
            }
        }

        if !position {
            return Err(Error::InvalidDeclaration("position is required".into()));
        }

        Ok(VertexDecl(Arc::new(DeclInner {
            id: DECL_IDS.fetch_add(1, Ordering::Relaxed),
            elements: elements.iter().cloned().collect(),
            stride,
        })))
    }

    /// The declaration matching `Vertex`.
    pub fn default_vertex() -> &'static [VertexElement] {
        static ELEMENTS: [VertexElement; 3] = [
            VertexElement {
                attribute: Attribute::Position,
                storage: Storage::Float3,
                offset: 0,
            },
            VertexElement {
                attribute: Attribute::TexCoordPixel,
                storage: Storage::Float2,
                offset: 12,
            },
            VertexElement {
                attribute: Attribute::Color,
                storage: Storage::Float4,
                offset: 20,
            },
        ];

        &ELEMENTS
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.0.stride
    }

    #[inline]
    pub fn elements(&self) -> &[VertexElement] {
        &self.0.elements
    }

    pub fn element(&self, attribute: Attribute) -> Option<&VertexElement> {
        self.0.elements.iter().find(|e| e.attribute == attribute)
    }

    fn downgrade(&self) -> Weak<DeclInner> {
        Arc::downgrade(&self.0)
    }
}

/// A vertex decoded into the components the software paths care about.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DecodedVertex {
    pub pos: [f32; 3],
    pub color: Color,
    /// Texture coordinates, in pixels if `VertexReader::pixel_texcoords`.
    pub uv: [f32; 2],
}

/// Random access decoding of raw vertex data through a layout.
#[derive(Debug, Copy, Clone)]
pub struct VertexReader<'a> {
    data: &'a [u8],
    elements: &'a [VertexElement],
    stride: usize,
}

impl<'a> VertexReader<'a> {
    pub fn new(data: &'a [u8], decl: Option<&'a VertexDecl>) -> Self {
        match decl {
            Some(decl) => VertexReader {
                data,
                elements: decl.elements(),
                stride: decl.stride(),
            },
            None => VertexReader {
                data,
                elements: VertexDecl::default_vertex(),
                stride: ::std::mem::size_of::<Vertex>(),
            },
        }
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() / self.stride
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The raw bytes of vertex `index`.
    #[inline]
    pub fn raw(&self, index: usize) -> &'a [u8] {
        &self.data[index * self.stride..(index + 1) * self.stride]
    }

    pub fn pixel_texcoords(&self) -> bool {
        !self
            .elements
            .iter()
            .any(|e| e.attribute == Attribute::TexCoord)
    }

    pub fn has_texcoords(&self) -> bool {
        self.elements.iter().any(|e| {
            e.attribute == Attribute::TexCoord || e.attribute == Attribute::TexCoordPixel
        })
    }

    pub fn get(&self, index: usize) -> DecodedVertex {
        let raw = self.raw(index);
        let mut v = DecodedVertex {
            pos: [0.0; 3],
            color: Color::white(),
            uv: [0.0; 2],
        };

        for e in self.elements {
            let c = e.storage.read(&raw[e.offset..]);
            match e.attribute {
                Attribute::Position => {
                    let z = if e.storage.components() > 2 { c[2] } else { 0.0 };
                    v.pos = [c[0], c[1], z];
                }
                Attribute::Color => v.color = Color::new(c[0], c[1], c[2], c[3]),
                Attribute::TexCoord | Attribute::TexCoordPixel => v.uv = [c[0], c[1]],
                Attribute::UserAttr(_) => {}
            }
        }

        v
    }
}

/// A declaration compiled for one device.
#[derive(Debug, Clone)]
pub enum CompiledDecl {
    /// Attribute streams, resolved against shader locations at draw time.
    Gl(SmallVec<[(Attribute, AttribLayout); 4]>),
    /// A vertex declaration object, absent if the device can't express it.
    D3d(Option<u32>),
}

#[derive(Debug)]
struct CacheEntry {
    decl: Option<Weak<DeclInner>>,
    compiled: CompiledDecl,
}

/// Lazily compiled declarations of one display, keyed by declaration id.
/// The `None` key holds the default `Vertex` layout.
#[derive(Debug, Default)]
pub struct DeclCache {
    entries: HashMap<Option<u64>, CacheEntry>,
}

impl DeclCache {
    pub fn new() -> Self {
        DeclCache::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Attribute streams for OpenGL.
    pub fn gl(&mut self, decl: Option<&VertexDecl>) -> SmallVec<[(Attribute, AttribLayout); 4]> {
        let entry = self.entries.entry(decl.map(|d| d.id())).or_insert_with(|| {
            let (elements, stride) = match decl {
                Some(d) => (d.elements(), d.stride()),
                None => (VertexDecl::default_vertex(), ::std::mem::size_of::<Vertex>()),
            };

            let streams = elements
                .iter()
                .map(|e| (e.attribute, e.layout(stride)))
                .collect();

            CacheEntry {
                decl: decl.map(|d| d.downgrade()),
                compiled: CompiledDecl::Gl(streams),
            }
        });

        match entry.compiled {
            CompiledDecl::Gl(ref streams) => streams.clone(),
            CompiledDecl::D3d(_) => SmallVec::new(),
        }
    }

    /// The vertex declaration object for Direct3D, compiling it on first use.
    /// `None` means the layout has no compiled form on this device.
    pub fn d3d(&mut self, device: &mut dyn D3dDevice, decl: Option<&VertexDecl>) -> Option<u32> {
        let key = decl.map(|d| d.id());
        if let Some(entry) = self.entries.get(&key) {
            if let CompiledDecl::D3d(v) = entry.compiled {
                return v;
            }
        }

        self.purge(device);

        let elements = match decl {
            Some(d) => d.elements(),
            None => VertexDecl::default_vertex(),
        };

        let compiled = d3d_elements(elements, &device.caps())
            .and_then(|elements| match device.create_vertex_declaration(&elements) {
                Ok(v) => Some(v),
                Err(err) => {
                    warn!("Failed to create vertex declaration: {}", err);
                    None
                }
            });

        self.entries.insert(
            key,
            CacheEntry {
                decl: decl.map(|d| d.downgrade()),
                compiled: CompiledDecl::D3d(compiled),
            },
        );

        compiled
    }

    /// Drops entries whose declaration no longer exists.
    fn purge(&mut self, device: &mut dyn D3dDevice) {
        let dead: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, e)| match e.decl {
                Some(ref w) => w.upgrade().is_none(),
                None => false,
            })
            .map(|(&k, _)| k)
            .collect();

        for key in dead {
            if let Some(CacheEntry {
                compiled: CompiledDecl::D3d(Some(v)),
                ..
            }) = self.entries.remove(&key)
            {
                let _ = device.release_vertex_declaration(v);
            }
        }
    }

    /// Releases every compiled form. Direct3D objects are released through
    /// `device` if one is given, otherwise they are forgotten.
    pub fn release(&mut self, mut device: Option<&mut dyn D3dDevice>) {
        for (_, entry) in self.entries.drain() {
            if let CompiledDecl::D3d(Some(v)) = entry.compiled {
                if let Some(ref mut device) = device {
                    if let Err(err) = device.release_vertex_declaration(v) {
                        warn!("Failed to release vertex declaration {}: {}", v, err);
                    }
                }
            }
        }
    }
}

/// Maps elements to a Direct3D declaration. Colors are four floats bound as
/// the second texture coordinate set, user attributes follow from the third.
pub fn d3d_elements(elements: &[VertexElement], caps: &D3dCaps) -> Option<Vec<D3dElement>> {
    let mut out = Vec::with_capacity(elements.len());
    for e in elements {
        let (usage, usage_index) = match e.attribute {
            Attribute::Position => (D3dUsage::Position, 0),
            Attribute::TexCoord | Attribute::TexCoordPixel => (D3dUsage::TexCoord, 0),
            Attribute::Color => (D3dUsage::TexCoord, 1),
            Attribute::UserAttr(n) => (D3dUsage::TexCoord, 2 + n),
        };

        out.push(D3dElement {
            offset: e.offset as u16,
            ty: e.storage.d3d_type(caps)?,
            usage,
            usage_index,
        });
    }

    Some(out)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_layout_matches_vertex() {
        assert_eq!(::std::mem::size_of::<Vertex>(), 36);
        let v = [Vertex::new(1.0, 2.0, 3.0, 4.0, Color::red())];
        let reader = VertexReader::new(as_bytes(&v), None);
        assert_eq!(reader.len(), 1);
        assert!(reader.pixel_texcoords());

        let d = reader.get(0);
        assert_eq!(d.pos, [1.0, 2.0, 0.0]);
        assert_eq!(d.uv, [3.0, 4.0]);
        assert_eq!(d.color, Color::red());
    }

    #[test]
    fn validation() {
        use self::Storage::*;
        let pos = Attribute::Position;

        let ok = [
            VertexElement::new(pos, Float2, 0),
            VertexElement::new(Attribute::TexCoord, NormalizedUShort2, 8),
        ];
        assert!(VertexDecl::new(&ok, 12).is_ok());

        let no_position = [VertexElement::new(Attribute::TexCoord, Float2, 0)];
        assert!(VertexDecl::new(&no_position, 8).is_err());

        let twice = [
            VertexElement::new(pos, Float2, 0),
            VertexElement::new(pos, Float2, 8),
        ];
        assert!(VertexDecl::new(&twice, 16).is_err());

        let overflow = [VertexElement::new(pos, Float3, 4)];
        assert!(VertexDecl::new(&overflow, 12).is_err());

        let color = [
            VertexElement::new(pos, Float2, 0),
            VertexElement::new(Attribute::Color, UByte4, 8),
        ];
        assert!(VertexDecl::new(&color, 12).is_err());

        let user = [
            VertexElement::new(pos, Float2, 0),
            VertexElement::new(Attribute::UserAttr(MAX_USER_ATTRIBUTES as u8), Float1, 8),
        ];
        assert!(VertexDecl::new(&user, 12).is_err());
    }

    #[test]
    fn attribute_names() {
        assert_eq!(Attribute::Position.name(), "al_pos");
        assert_eq!(Attribute::TexCoordPixel.name(), "al_texcoord");
        assert_eq!(Attribute::UserAttr(3).name(), "al_user_attr_3");
    }

    #[test]
    fn decode_storage() {
        let mut buf = [0u8; 8];
        NativeEndian::write_i16(&mut buf[0..], 32767);
        NativeEndian::write_i16(&mut buf[2..], -32768);
        assert_eq!(Storage::NormalizedShort2.read(&buf), [1.0, -1.0, 0.0, 1.0]);
        assert_eq!(Storage::Short2.read(&buf), [32767.0, -32768.0, 0.0, 1.0]);

        NativeEndian::write_u16(&mut buf[0..], half::f16::from_f32(0.5).to_bits());
        NativeEndian::write_u16(&mut buf[2..], half::f16::from_f32(2.0).to_bits());
        assert_eq!(Storage::HalfFloat2.read(&buf), [0.5, 2.0, 0.0, 1.0]);

        assert_eq!(
            Storage::NormalizedUByte4.read(&[255, 0, 255, 0]),
            [1.0, 0.0, 1.0, 0.0]
        );
    }

    #[test]
    fn d3d_mapping_respects_caps() {
        let mut caps = D3dCaps {
            pixel_shader: (3, 0),
            vertex_shader: (3, 0),
            float16_declarations: false,
            normalized_declarations: true,
        };

        let elements = [
            VertexElement::new(Attribute::Position, Storage::HalfFloat2, 0),
            VertexElement::new(Attribute::Color, Storage::Float4, 4),
        ];
        assert!(d3d_elements(&elements, &caps).is_none());

        caps.float16_declarations = true;
        let mapped = d3d_elements(&elements, &caps).unwrap();
        assert_eq!(mapped[1].usage, D3dUsage::TexCoord);
        assert_eq!(mapped[1].usage_index, 1);
    }
}
