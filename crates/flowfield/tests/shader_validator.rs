use std::fs;
use std::path::Path;

#[test]
fn validate_all_shaders() {
    let shader_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("src/gpu/shaders");
    let mut errors = Vec::new();

    assert!(shader_dir.exists(), "Shader directory not found: {shader_dir:?}");

    let mut count = 0;
    for entry in fs::read_dir(&shader_dir).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().is_some_and(|ext| ext == "wgsl") {
            validate_shader(&path, &mut errors);
            count += 1;
        }
    }

    assert_eq!(count, 3, "expected update, draw and screen shaders");
    if !errors.is_empty() {
        panic!("Shader validation failed:\n{}", errors.join("\n"));
    }
}

fn validate_shader(path: &Path, errors: &mut Vec<String>) {
    let source = fs::read_to_string(path).unwrap();
    let module = match naga::front::wgsl::parse_str(&source) {
        Ok(module) => module,
        Err(e) => {
            errors.push(format!("Failed to parse {:?}:\n{}", path.file_name().unwrap(), e.emit_to_string(&source)));
            return;
        }
    };

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    if let Err(e) = validator.validate(&module) {
        errors.push(format!("Failed to validate {:?}:\n{:?}", path.file_name().unwrap(), e));
        return;
    }

    for stage in ["vs_main", "fs_main"] {
        if !module.entry_points.iter().any(|ep| ep.name == stage) {
            errors.push(format!("{:?} has no {stage} entry point", path.file_name().unwrap()));
        }
    }
}
