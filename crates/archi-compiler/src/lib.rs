//! Archi Compiler - Object Graph to Image Encoding
//!
//! This crate implements the typed front end that lowers a declarative
//! object graph into an instruction log and encodes it as a relocatable
//! binary image.

pub mod class;
pub mod context;
pub mod error;
pub mod image;
pub mod params;
pub mod registry;

pub use context::Context;
pub use error::{CompileError, CompileResult};
pub use image::{image_digest, ImageFile, Manifest, INSTRUCTIONS_CONTENT};
pub use params::{Parameters, SourceValue, TypedValue};
pub use registry::Registry;

// Re-export the class machinery and the layers below for convenience
pub use class::{
    array_class, base_class, parameters_class, ArrayClass, BaseClass, ClassSpec, ContextClass,
    ParameterSchema, ParametersClass, ARRAY_TYPE, PARAMETERS_TYPE,
};
pub use archi_image::Value;
pub use archi_ir::{Instr, Opcode, ParamList, PrettyPrint, Slot};
pub use archi_types::{builtin, TypeDescriptor, TypeTable};

/// Main compiler entry point
#[derive(Default)]
pub struct Compiler {
    registry: Registry,
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
        }
    }

    /// The registry graph operations run against
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Mutable access to the registry
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Image assembler over the current graph
    pub fn image(&self) -> ImageFile<'_> {
        ImageFile::new(&self.registry)
    }

    /// Compile the graph into an image mapped at `base`
    pub fn compile(&self, base: usize) -> CompileResult<Vec<u8>> {
        self.image().encode_at(base)
    }
}
