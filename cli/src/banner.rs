use grayscope_core::prelude::*;

pub fn print(config: &Config, classifier: &Classifier) {
    for line in lines(config, classifier) {
        println!("{line}");
    }
}

fn lines(config: &Config, classifier: &Classifier) -> Vec<String> {
    let rule = "=".repeat(60);
    let mut lines = vec![rule.clone()];
    match &config.model {
        Some(path) => lines.push(format!("Model path: {}", path.display())),
        None => lines.push("Model path: (none)".to_string()),
    }
    if let Some(format) = config.format {
        lines.push(format!("Model format: {format}"));
    }
    lines.push(format!("Model loaded: {}", if classifier.has_model() { "yes" } else { "no" }));
    let labels = classifier.labels();
    let classes: Vec<String> =
        labels.iter().map(|label| format!("{} {}", labels.icon_for(label), label)).collect();
    lines.push(format!("Classes: {}", classes.join(", ")));
    lines.push(format!("Fallback icon: {}", labels.default_icon()));
    let shape: Vec<String> =
        classifier.preprocessor().input_shape().iter().map(|d| d.to_string()).collect();
    lines.push(format!("Input: {} ({:?})", shape.join("x"), classifier.preprocessor().layout));
    lines.push(format!("Activation: {:?}", classifier.activation()));
    lines.push(rule);
    lines
}
