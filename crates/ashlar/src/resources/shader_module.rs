use crate::{context::Device, error::ShaderError};
use ash::vk;
use const_cstr::const_cstr;
use std::{ffi::CString, path::Path, sync::Arc};

const_cstr! {
    DEFAULT_ENTRY_POINT = "main";
}

#[cfg(feature = "shader_reflection")]
use super::{descriptor::DescriptorBinding, DescriptorSetLayout, Reflection};

///Pipeline stage a shader module is written for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderKind {
    ///Derives the kind from the usual GLSL file extensions (`.vert`, `.frag`, `.comp`). A trailing `.spv` is ignored, so
    /// `triangle.vert.spv` is a vertex shader.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ShaderError> {
        let path = path.as_ref();
        let stem_path;
        let path = if path.extension().and_then(|e| e.to_str()) == Some("spv") {
            stem_path = path.with_extension("");
            stem_path.as_path()
        } else {
            path
        };

        match path.extension().and_then(|e| e.to_str()) {
            Some("vert") => Ok(ShaderKind::Vertex),
            Some("frag") => Ok(ShaderKind::Fragment),
            Some("comp") => Ok(ShaderKind::Compute),
            _ => Err(ShaderError::UnknownStage(path.display().to_string())),
        }
    }

    pub fn stage_flags(&self) -> vk::ShaderStageFlags {
        match self {
            ShaderKind::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderKind::Fragment => vk::ShaderStageFlags::FRAGMENT,
            ShaderKind::Compute => vk::ShaderStageFlags::COMPUTE,
        }
    }
}

impl From<ShaderKind> for vk::ShaderStageFlags {
    fn from(kind: ShaderKind) -> Self {
        kind.stage_flags()
    }
}

#[cfg(feature = "shader_compiler")]
impl From<ShaderKind> for shaderc::ShaderKind {
    fn from(kind: ShaderKind) -> Self {
        match kind {
            ShaderKind::Vertex => shaderc::ShaderKind::Vertex,
            ShaderKind::Fragment => shaderc::ShaderKind::Fragment,
            ShaderKind::Compute => shaderc::ShaderKind::Compute,
        }
    }
}

///Compiles GLSL `source` to SPIR-V words targeting Vulkan 1.2. `name` is only used in error messages.
#[cfg(feature = "shader_compiler")]
pub fn compile_glsl(source: &str, kind: ShaderKind, name: &str) -> Result<Vec<u32>, ShaderError> {
    let mut compiler = shaderc::Compiler::new()
        .ok_or_else(|| ShaderError::CompilationError(String::from("shaderc is not available")))?;
    let mut options = shaderc::CompileOptions::new().ok_or_else(|| {
        ShaderError::CompilationError(String::from("could not create shaderc options"))
    })?;
    options.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_2 as u32,
    );

    let artifact = compiler
        .compile_into_spirv(source, kind.into(), name, "main", Some(&options))
        .map_err(|e| ShaderError::CompilationError(format!("{}: {}", name, e)))?;

    #[cfg(feature = "logging")]
    if artifact.get_num_warnings() > 0 {
        log::warn!("{}: {}", name, artifact.get_warning_messages());
    }

    Ok(artifact.as_binary().to_vec())
}

///Single shader module
pub struct ShaderModule {
    pub device: Arc<Device>,
    pub module: vk::ShaderModule,
    ///saves the descriptor interface of this module where each bindings `stages` is marked as `ALL`.
    /// for best performance those might be optimized by the user.
    #[cfg(feature = "shader_reflection")]
    pub descriptor_interface: Vec<(u32, Vec<DescriptorBinding>)>,
}

impl ShaderModule {
    ///Reads file at `path`, checks that it is a spirv file and, if so, tries to create the shader module from it.
    pub fn new_from_file(device: &Arc<Device>, file: impl AsRef<Path>) -> Result<Self, ShaderError> {
        //try to read the file. Throws an error if it is none-existent etc.
        let mut file = std::fs::File::open(file)?;
        let code = ash::util::read_spv(&mut file)?;

        Self::new(device, &code)
    }

    ///Creates the module from raw bytes, for instance from `include_bytes!`. Fails if the bytes are not a multiple of four long.
    pub fn from_bytes(device: &Arc<Device>, bytes: &[u8]) -> Result<Self, ShaderError> {
        let code = ash::util::read_spv(&mut std::io::Cursor::new(bytes))?;
        Self::new(device, &code)
    }

    ///Compiles the GLSL `source` and creates the module from the result.
    #[cfg(feature = "shader_compiler")]
    pub fn from_glsl(
        device: &Arc<Device>,
        source: &str,
        kind: ShaderKind,
        name: &str,
    ) -> Result<Self, ShaderError> {
        let code = compile_glsl(source, kind, name)?;
        Self::new(device, &code)
    }

    pub fn new(device: &Arc<Device>, code: &[u32]) -> Result<Self, ShaderError> {
        #[cfg(feature = "shader_reflection")]
        let descriptor_interface = {
            let reflection = Reflection::new_from_code(bytemuck::cast_slice(code))?;
            reflection.get_bindings(vk::ShaderStageFlags::ALL)?
        };

        let create_info = vk::ShaderModuleCreateInfo::builder().code(code);
        let module = unsafe { device.inner.create_shader_module(&create_info, None)? };

        Ok(ShaderModule {
            device: device.clone(),
            module,
            #[cfg(feature = "shader_reflection")]
            descriptor_interface,
        })
    }

    ///Creates a descriptor set layout for each reflected descriptor set, with the bindings visible to `stages`. The `u32` in the
    /// returned list is the set-id of each descriptor set as found in the reflection information.
    ///
    ///If you need finer control, consider creating the layouts yourself and only refer to the inner `descriptor_interface`.
    #[cfg(feature = "shader_reflection")]
    pub fn create_descriptor_set_layouts(
        &self,
        stages: vk::ShaderStageFlags,
    ) -> Result<Vec<(u32, DescriptorSetLayout)>, crate::error::DescriptorError> {
        let mut layouts = Vec::with_capacity(self.descriptor_interface.len());
        for (setid, bindings) in &self.descriptor_interface {
            let bindings = bindings
                .iter()
                .map(|b| DescriptorBinding { stages, ..*b })
                .collect::<Vec<_>>();
            let layout = DescriptorSetLayout::new(&self.device, &bindings)?;
            layouts.push((*setid, layout));
        }

        Ok(layouts)
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_shader_module(self.module, None) }
    }
}

///A shader module bound to the stage it's used in, and the entry point that is called.
pub struct ShaderStage {
    pub module: Arc<ShaderModule>,
    pub kind: ShaderKind,
    pub entry_point: CString,
}

impl ShaderStage {
    ///Stage with the default `main` entry point.
    pub fn new(module: &Arc<ShaderModule>, kind: ShaderKind) -> Self {
        ShaderStage {
            module: module.clone(),
            kind,
            entry_point: DEFAULT_ENTRY_POINT.as_cstr().to_owned(),
        }
    }

    pub fn with_entry_point(mut self, name: &str) -> Result<Self, ShaderError> {
        self.entry_point =
            CString::new(name).map_err(|_| ShaderError::InvalidEntryPoint(name.to_owned()))?;
        Ok(self)
    }

    ///Stage create info. Borrows `self` for the entry point name.
    pub fn as_create_info(&self) -> vk::PipelineShaderStageCreateInfoBuilder<'_> {
        vk::PipelineShaderStageCreateInfo::builder()
            .module(self.module.module)
            .stage(self.kind.stage_flags())
            .name(&self.entry_point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(ShaderModule: Send, Sync);
        assert_impl_all!(ShaderStage: Send, Sync);
    }

    #[test]
    fn default_entry_point_is_main() {
        assert_eq!(DEFAULT_ENTRY_POINT.as_cstr().to_str().unwrap(), "main");
    }

    #[test]
    fn kind_from_extension() {
        assert_eq!(ShaderKind::from_path("a/b/tri.vert").unwrap(), ShaderKind::Vertex);
        assert_eq!(ShaderKind::from_path("tri.frag.spv").unwrap(), ShaderKind::Fragment);
        assert_eq!(ShaderKind::from_path("cull.comp").unwrap(), ShaderKind::Compute);
        assert!(matches!(
            ShaderKind::from_path("shader.glsl"),
            Err(ShaderError::UnknownStage(_))
        ));
        assert!(matches!(
            ShaderKind::from_path("shader.spv"),
            Err(ShaderError::UnknownStage(_))
        ));
    }

    #[test]
    fn kind_to_stage_flags() {
        assert_eq!(
            vk::ShaderStageFlags::from(ShaderKind::Vertex),
            vk::ShaderStageFlags::VERTEX
        );
        assert_eq!(
            ShaderKind::Fragment.stage_flags(),
            vk::ShaderStageFlags::FRAGMENT
        );
        assert_eq!(
            ShaderKind::Compute.stage_flags(),
            vk::ShaderStageFlags::COMPUTE
        );
    }

    #[cfg(feature = "shader_compiler")]
    #[test]
    fn compile_errors_are_reported() {
        let err = compile_glsl("#version 450\nvoid main() { nope }", ShaderKind::Vertex, "broken.vert");
        assert!(matches!(err, Err(ShaderError::CompilationError(_))));
    }
}
