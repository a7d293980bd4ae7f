use kube::CustomResourceExt;

use insight_domain::ObservabilityStack;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&ObservabilityStack::crd())?);
    Ok(())
}
