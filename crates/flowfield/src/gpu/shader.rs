// Shipped WGSL sources and their pre-flight validation

use crate::error::{FieldError, FieldResult};

pub const UPDATE_SHADER: &str = include_str!("shaders/update.wgsl");
pub const DRAW_SHADER: &str = include_str!("shaders/draw.wgsl");
pub const SCREEN_SHADER: &str = include_str!("shaders/screen.wgsl");

/// Parses and validates WGSL with naga before any device object is created,
/// so a broken shader surfaces as `ResourceUnavailable` instead of a device panic.
pub fn validate(name: &str, source: &str) -> FieldResult<()> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| {
        FieldError::ResourceUnavailable(format!(
            "failed to parse {name}:\n{}",
            e.emit_to_string(source)
        ))
    })?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator.validate(&module).map_err(|e| {
        FieldError::ResourceUnavailable(format!("failed to validate {name}: {e:?}"))
    })?;
    Ok(())
}

pub fn validate_all() -> FieldResult<()> {
    validate("update.wgsl", UPDATE_SHADER)?;
    validate("draw.wgsl", DRAW_SHADER)?;
    validate("screen.wgsl", SCREEN_SHADER)
}

pub(crate) fn create_module(device: &wgpu::Device, name: &str, source: &str) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(name),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shipped_shaders_validate() {
        validate_all().unwrap();
    }

    #[test]
    fn test_broken_shader_is_resource_unavailable() {
        let result = validate("broken.wgsl", "fn main( {");
        assert!(matches!(result, Err(FieldError::ResourceUnavailable(_))));
    }

    #[test]
    fn test_invalid_binding_use_is_rejected() {
        let source = "@fragment fn fs_main() -> @location(0) vec4<f32> { return undefined_value; }";
        assert!(validate("bad.wgsl", source).is_err());
    }
}
