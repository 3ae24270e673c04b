use infsched_operator::crd::InferenceScheduler;
use kube::core::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crd = InferenceScheduler::crd();
    let yaml = serde_yaml::to_string(&crd)?;
    println!("{}", yaml);
    Ok(())
}
