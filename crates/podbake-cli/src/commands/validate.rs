use super::{artifact_mode_label, json_pretty, load_config, EXIT_SUCCESS};
use std::path::Path;

pub fn run(config_path: &Path, json: bool) -> Result<u8, String> {
    let config = load_config(config_path)?;
    let artifact = artifact_mode_label(&config.artifact_mode());
    if json {
        let payload = serde_json::json!({
            "valid": true,
            "image": config.image,
            "artifact": artifact,
            "provisioners": config.provisioners.len(),
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("{} is valid", config_path.display());
        println!("image:        {}", config.image);
        println!("artifact:     {artifact}");
        println!("provisioners: {}", config.provisioners.len());
    }
    Ok(EXIT_SUCCESS)
}
