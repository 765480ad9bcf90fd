use log::info;
use microdiff::{config, zero_grad, Mlp, Module, Var};

fn main() -> microdiff::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = config::from_env()?;
    let mlp = Mlp::from_config(&config)?;

    let xs = [
        [2.0, 3.0, -1.0],
        [3.0, -1.0, 0.5],
        [0.5, 1.0, 1.0],
        [1.0, 1.0, -1.0],
    ];
    let ys = [1.0, -1.0, 1.0, 1.0];

    let params = mlp.parameters();
    for step in 0..config.num_steps {
        let mut predictions = Vec::with_capacity(xs.len());
        let mut terms = Vec::with_capacity(xs.len());
        for (x, y) in xs.iter().zip(ys) {
            let inputs: Vec<Var> = x.iter().copied().map(Var::from).collect();
            let prediction = mlp.forward_scalar(&inputs)?;
            terms.push((&prediction - y).powf(2.0));
            predictions.push(prediction.data());
        }
        let loss: Var = terms.iter().sum();

        if config.log_every > 0 && step % config.log_every == 0 {
            info!("step {step}: loss {:.6} predictions {predictions:.3?}", loss.data());
        }

        zero_grad(&params);
        loss.backward();

        for p in &params {
            p.set_data(p.data() - config.learning_rate * p.grad())?;
        }
    }

    let final_predictions = xs
        .iter()
        .map(|x| {
            let inputs: Vec<Var> = x.iter().copied().map(Var::from).collect();
            mlp.forward_scalar(&inputs).map(|p| p.data())
        })
        .collect::<microdiff::Result<Vec<f64>>>()?;
    info!("targets {ys:?}, predictions {final_predictions:.3?}");
    Ok(())
}
