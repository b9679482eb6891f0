use ash::vk;

use super::DescriptorBinding;
use crate::error::ShaderError;

///Reflection interface for some shader source.
pub struct Reflection {
    inner: rspirv_reflect::Reflection,
}

fn descriptor_count_from_binding(binding: rspirv_reflect::BindingCount) -> u32 {
    match binding {
        rspirv_reflect::BindingCount::One => 1,
        rspirv_reflect::BindingCount::StaticSized(n) => n as u32,
        rspirv_reflect::BindingCount::Unbounded => {
            #[cfg(feature = "logging")]
            log::error!("Found unbound descriptor set, can't reflect correct size. Using 1 instead");
            1
        }
    }
}

impl Reflection {
    pub fn new_from_code(shader_code: &[u8]) -> Result<Self, ShaderError> {
        Ok(Reflection {
            inner: rspirv_reflect::Reflection::new_from_spirv(shader_code)
                .map_err(|e| ShaderError::ReflectionError(e.to_string()))?,
        })
    }

    ///Generates bindings for each descriptor set, ordered by set index. Sets the shader `stages` of each binding to the supplied ones.
    pub fn get_bindings(
        &self,
        stages: vk::ShaderStageFlags,
    ) -> Result<Vec<(u32, Vec<DescriptorBinding>)>, ShaderError> {
        #[cfg(feature = "shader_reflection_verbose")]
        log::info!("Reflection:");

        let sets = self
            .inner
            .get_descriptor_sets()
            .map_err(|e| ShaderError::ReflectionError(e.to_string()))?;

        Ok(sets
            .into_iter()
            .map(|(set_idx, descriptor_set)| {
                #[cfg(feature = "shader_reflection_verbose")]
                log::info!("  Set {}", set_idx);

                let set_bindings = descriptor_set
                    .into_iter()
                    .map(|(binding_id, binding)| {
                        #[cfg(feature = "shader_reflection_verbose")]
                        log::info!("    Binding {} = {:?}", binding_id, binding);

                        DescriptorBinding {
                            binding: binding_id,
                            count: descriptor_count_from_binding(binding.binding_count),
                            ty: vk::DescriptorType::from_raw(binding.ty.0 as i32),
                            stages,
                        }
                    })
                    .collect::<Vec<_>>();
                (set_idx, set_bindings)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Reflection: Send, Sync);
    }

    #[test]
    fn binding_counts() {
        assert_eq!(descriptor_count_from_binding(rspirv_reflect::BindingCount::One), 1);
        assert_eq!(
            descriptor_count_from_binding(rspirv_reflect::BindingCount::StaticSized(4)),
            4
        );
        assert_eq!(
            descriptor_count_from_binding(rspirv_reflect::BindingCount::Unbounded),
            1
        );
    }

    #[test]
    fn garbage_is_a_reflection_error() {
        let err = Reflection::new_from_code(&[0u8; 16]).err();
        assert!(matches!(err, Some(ShaderError::ReflectionError(_))));
    }
}
