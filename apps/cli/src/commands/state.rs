//! 状态查询

use crate::exit::Exit;
use anyhow::Result;
use gripper_client::GripperClient;

pub fn execute(client: &GripperClient) -> Result<Exit> {
    let state = client.state();
    let limits = client.limits();

    println!("width:      {:.4} m", state.width);
    println!("max_width:  {:.4} m", state.max_width);
    println!("force:      {:.2} N", state.force);
    println!("moving:     {}", state.is_moving);
    println!("grasped:    {}", state.is_grasped);
    println!(
        "last_error: {}",
        state.last_error.as_deref().unwrap_or("none")
    );
    println!(
        "limits:     width [{:.4}, {:.4}] m, force <= {:.1} N, speed <= {:.3} m/s",
        limits.min_width, limits.max_width, limits.max_force, limits.max_speed
    );
    Ok(Exit::Success)
}
